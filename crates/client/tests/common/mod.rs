//! Shared fixtures: a scripted transport and a wired-up client.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use solarcare_client::{
    ApiClient, BaseQuery, ClientConfig, HttpRequest, HttpResponse, HttpTransport,
    LogoutCoordinator, QueryCache, TransportError,
};
use solarcare_core::{AppState, AuthState, ManualClock, Session, Store, UserProfile};
use solarcare_storage::{ApiCache, MemoryStore, OfflineQueue, StorageHelper};

pub const NOW: i64 = 1_700_000_000_000;

/// One scripted transport outcome.
#[derive(Clone)]
pub enum Step {
    Respond(u16, Value),
    Fail(TransportError),
    Panic(&'static str),
    /// Respond after sleeping.
    Delayed(Duration, u16, Value),
    /// Never resolves.
    Hang,
}

impl Step {
    pub fn status(status: u16) -> Self {
        Step::Respond(status, json!({}))
    }

    pub fn network() -> Self {
        Step::Fail(TransportError::Network("connection refused".into()))
    }
}

/// Plays back a fixed script, then repeats `fallback` forever.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: Step::Respond(200, json!({})),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new(vec![]).then_always(step)
    }

    pub fn then_always(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Respond(status, body) => Ok(HttpResponse::new(status, body)),
            Step::Fail(err) => Err(err),
            Step::Panic(msg) => panic!("{msg}"),
            Step::Delayed(delay, status, body) => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse::new(status, body))
            }
            Step::Hang => futures::future::pending().await,
        }
    }
}

pub fn user() -> UserProfile {
    serde_json::from_value(json!({"id": "u-1", "phone": "1234567890", "name": "Asha"})).unwrap()
}

pub fn logged_in_state() -> AppState {
    AppState {
        auth: AuthState::with_session(Session {
            token: "tok-1".into(),
            refresh_token: Some("ref-1".into()),
            user: user(),
            last_login_time: NOW,
        }),
        ..Default::default()
    }
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.base_url = "http://api.test/api".into();
    config.app_version = "9.9.9".into();
    config.use_demo_api = false;
    config.timeout = Duration::from_secs(10);
    config
}

pub struct Harness {
    pub store: Store,
    pub api: ApiClient,
    pub logout: LogoutCoordinator,
    pub transport: Arc<ScriptedTransport>,
    pub kv: Arc<MemoryStore>,
    pub clock: ManualClock,
}

pub fn harness(transport: ScriptedTransport, logged_in: bool) -> Harness {
    let config = Arc::new(test_config());
    let store = Store::new(if logged_in {
        logged_in_state()
    } else {
        AppState::default()
    });
    let kv = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(NOW);
    let storage = StorageHelper::new(kv.clone());
    let cache = ApiCache::new(storage.clone(), Arc::new(clock.clone()));
    let queries = QueryCache::new(config.query_freshness);
    let logout = LogoutCoordinator::with_persisted_cache(
        store.clone(),
        queries.clone(),
        cache.clone(),
        config.logout.clone(),
    );
    let transport = Arc::new(transport);
    let base = BaseQuery::new(transport.clone(), store.clone(), config, logout.clone());
    let offline = OfflineQueue::new(storage, Arc::new(clock.clone()));
    let api = ApiClient::new(base, queries, cache, offline);

    Harness {
        store,
        api,
        logout,
        transport,
        kv,
        clock,
    }
}
