//! `solarcare-app` -- headless driver for the SolarCare customer client.
//!
//! Boots the client the way the mobile shell does (rehydrate the saved
//! session, wire the API client), signs in with phone + OTP when there is
//! no live session, walks the catalog and the customer's leads, replays
//! any offline requests and shuts down cleanly.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default         | Description                            |
//! |----------------------|----------|-----------------|----------------------------------------|
//! | `STORAGE_SECRET`     | yes      | --              | Secret the on-disk store key is derived from |
//! | `SOLARCARE_DATA_DIR` | no       | `./.solarcare`  | Directory for the encrypted store      |
//! | `LOGIN_PHONE`        | no       | `1234567890`    | Phone number to sign in with           |
//! | `LOGIN_OTP`          | no       | demo OTP        | One-time code to verify                |
//!
//! API settings (`APP_ENV`, `API_BASE_URL`, ...) are read by
//! [`ClientConfig::from_env`].

mod flow;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use solarcare_client::{AppContext, ClientConfig, DemoTransport, HttpTransport, ReqwestTransport};
use solarcare_core::{Clock, SystemClock};
use solarcare_storage::EncryptedFileStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DATA_DIR: &str = "./.solarcare";

/// Simulated round trip of the demo backend.
const DEMO_LATENCY: Duration = Duration::from_millis(150);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "solarcare_app=info,solarcare_client=info,solarcare_persist=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    tracing::info!(
        environment = config.environment.as_str(),
        base_url = %config.base_url,
        demo = config.use_demo_api,
        "Loaded client configuration"
    );

    let secret = std::env::var("STORAGE_SECRET")
        .context("STORAGE_SECRET environment variable is required")?;
    let data_dir = std::env::var("SOLARCARE_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let kv = EncryptedFileStore::open(&data_dir, secret.as_bytes())
        .await
        .with_context(|| format!("Failed to open encrypted store at {data_dir}"))?;
    tracing::info!(data_dir = %data_dir, "Encrypted store ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport: Arc<dyn HttpTransport> = if config.use_demo_api {
        tracing::info!("Using in-process demo backend");
        Arc::new(DemoTransport::new(Arc::clone(&clock)).with_latency(DEMO_LATENCY))
    } else {
        Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?)
    };

    let ctx = AppContext::boot(config, Arc::new(kv), transport, clock).await;

    let phone = std::env::var("LOGIN_PHONE").unwrap_or_else(|_| "1234567890".into());
    let otp = std::env::var("LOGIN_OTP").unwrap_or_else(|_| solarcare_client::DEMO_OTP.into());

    let outcome = flow::run(&ctx, &phone, &otp).await;

    ctx.shutdown().await.context("Failed to persist session on shutdown")?;
    outcome
}
