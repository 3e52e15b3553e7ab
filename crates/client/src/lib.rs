//! Resilient API client for the SolarCare customer app.
//!
//! - [`base_query`] -- the single request path: headers, retry with
//!   backoff, idempotent logout on auth failure, loading flag.
//! - [`logout`] -- the logout latch state machine.
//! - [`api`] -- tagged query cache, mutations and offline replay.
//! - [`endpoints`] -- typed auth / services / leads endpoints.
//! - [`auth`] -- validated login, logout and profile operations.
//! - [`context`] -- boot and shutdown of the whole client.
//! - [`demo`] -- in-process backend used when no API is configured.

pub mod api;
pub mod auth;
pub mod base_query;
pub mod config;
pub mod context;
pub mod demo;
pub mod endpoints;
pub mod error;
pub mod loading;
pub mod logout;
pub mod query_cache;
pub mod request;
pub mod retry;
pub mod transport;

pub use api::{decode, ApiClient, FlushReport, Submission};
pub use auth::AuthService;
pub use base_query::BaseQuery;
pub use config::{ClientConfig, ConfigError, Environment, LogoutLatchConfig};
pub use context::AppContext;
pub use demo::{DemoTransport, DEMO_OTP};
pub use error::{ApiError, ApiErrorKind};
pub use loading::LoadingGuard;
pub use logout::{LatchPhase, LogoutCoordinator};
pub use query_cache::{CacheTag, QueryCache};
pub use request::ApiRequest;
pub use retry::{classify_status, FailureClass, RetryPolicy};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError};
