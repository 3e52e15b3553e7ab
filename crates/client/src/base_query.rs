//! The resilient request path every API call goes through.
//!
//! Per call: hold the loading flag (unless background), attach the
//! standard headers and the current bearer token, send, and then
//!
//! - 2xx: return the body;
//! - 401/403: run the idempotent logout and return the error;
//! - network failure, timeout, 408/429/5xx: back off and retry while the
//!   retry budget lasts;
//! - anything else: return the error as-is.
//!
//! A panicking transport is caught and reported as [`ApiError::Fetch`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use solarcare_core::Store;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::loading::LoadingGuard;
use crate::logout::LogoutCoordinator;
use crate::request::ApiRequest;
use crate::transport::{HttpRequest, HttpTransport};

#[derive(Clone)]
pub struct BaseQuery {
    transport: Arc<dyn HttpTransport>,
    store: Store,
    config: Arc<ClientConfig>,
    logout: LogoutCoordinator,
}

impl BaseQuery {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Store,
        config: Arc<ClientConfig>,
        logout: LogoutCoordinator,
    ) -> Self {
        Self {
            transport,
            store,
            config,
            logout,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn logout(&self) -> &LogoutCoordinator {
        &self.logout
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let _loading = LoadingGuard::start(&self.store, request.background);
        self.run(request).await
    }

    /// Like [`execute`](Self::execute), but resolves to
    /// [`ApiError::Aborted`] as soon as `cancel` fires.
    pub async fn execute_cancellable(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        let _loading = LoadingGuard::start(&self.store, request.background);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(method = %request.method, path = %request.path, "Request aborted");
                Err(ApiError::Aborted)
            }
            result = self.run(request) => result,
        }
    }

    /// Build the wire request. The token is read once, here.
    fn prepare(&self, request: &ApiRequest) -> HttpRequest {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            ("X-App-Version".to_string(), self.config.app_version.clone()),
            ("X-Platform".to_string(), self.config.platform.clone()),
        ];
        if let Some(token) = self.store.token() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        HttpRequest {
            method: request.method,
            url: format!("{}{}", self.config.base_url.trim_end_matches('/'), request.path),
            path: request.path.clone(),
            query: request.params.clone(),
            headers,
            body: request.body.clone(),
            timeout: self.config.timeout,
        }
    }

    async fn run(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let http = self.prepare(request);
        let policy = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            let err = match self.send_once(http.clone()).await {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };

            if err.is_auth() {
                tracing::warn!(method = %http.method, path = %http.path, status = ?err.status(), "Request rejected as unauthenticated");
                if request.logout_on_auth_failure {
                    self.logout.trigger().await;
                }
                return Err(err);
            }

            if !err.is_retryable() {
                tracing::debug!(method = %http.method, path = %http.path, error = %err, "Request failed");
                return Err(err);
            }

            if attempt >= policy.max_retries {
                tracing::error!(
                    method = %http.method,
                    path = %http.path,
                    attempts = attempt + 1,
                    error = %err,
                    "Request failed after all retries"
                );
                return Err(err);
            }

            let delay = policy.jittered_delay(attempt);
            tracing::warn!(
                method = %http.method,
                path = %http.path,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One transport call. Never panics.
    async fn send_once(&self, http: HttpRequest) -> Result<Value, ApiError> {
        let timeout = http.timeout;
        let call = AssertUnwindSafe(self.transport.send(http)).catch_unwind();

        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(ApiError::Timeout(timeout)),
        };

        match outcome {
            Err(panic) => Err(ApiError::Fetch(panic_message(panic))),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(response)) if (200..300).contains(&response.status) => Ok(response.body),
            Ok(Ok(response)) => Err(ApiError::from_response(response.status, response.body)),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "transport panicked".to_string()
    }
}
