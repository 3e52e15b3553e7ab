//! Cached queries, tag-invalidating mutations and offline replay on top
//! of [`BaseQuery`].

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use solarcare_storage::{ApiCache, OfflineQueue};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::base_query::BaseQuery;
use crate::error::ApiError;
use crate::query_cache::{CacheTag, QueryCache};
use crate::request::ApiRequest;
use crate::transport::Method;

/// Outcome of a mutation that may be deferred while offline.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T = Value> {
    Sent(T),
    /// Stored in the offline queue for later replay.
    Queued(Uuid),
}

impl<T> Submission<T> {
    /// Convert the sent payload, leaving a queued id untouched.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Submission<U>, E> {
        match self {
            Submission::Sent(data) => f(data).map(Submission::Sent),
            Submission::Queued(id) => Ok(Submission::Queued(id)),
        }
    }

    /// The server's answer, if the request was sent.
    pub fn sent(self) -> Option<T> {
        match self {
            Submission::Sent(data) => Some(data),
            Submission::Queued(_) => None,
        }
    }
}

/// Result of one pass over the offline queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    /// Rejected by the server; removed without retrying.
    pub dropped: usize,
    /// Still unreachable; left queued.
    pub kept: usize,
}

#[derive(Clone)]
pub struct ApiClient {
    base: BaseQuery,
    queries: QueryCache,
    persisted: ApiCache,
    offline: OfflineQueue,
}

impl ApiClient {
    pub fn new(
        base: BaseQuery,
        queries: QueryCache,
        persisted: ApiCache,
        offline: OfflineQueue,
    ) -> Self {
        Self {
            base,
            queries,
            persisted,
            offline,
        }
    }

    pub fn base(&self) -> &BaseQuery {
        &self.base
    }

    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    pub fn offline_queue(&self) -> &OfflineQueue {
        &self.offline
    }

    /// Uncached request.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.base.execute(&request).await
    }

    /// Serve `key` from the query cache, or fetch and cache it.
    pub async fn query(
        &self,
        key: &str,
        request: ApiRequest,
        tags: Vec<CacheTag>,
    ) -> Result<Value, ApiError> {
        self.query_cancellable(key, request, tags, &CancellationToken::new())
            .await
    }

    /// [`query`](Self::query) that can be aborted. An aborted or failed
    /// request never writes to the cache.
    pub async fn query_cancellable(
        &self,
        key: &str,
        request: ApiRequest,
        tags: Vec<CacheTag>,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        self.fetch(key, request, tags, cancel)
            .await
            .map(|(data, _)| data)
    }

    /// Cached fetch. Also returns the cache generation the data belongs
    /// to, or `None` when the session was torn down while the request was
    /// in flight.
    async fn fetch(
        &self,
        key: &str,
        request: ApiRequest,
        tags: Vec<CacheTag>,
        cancel: &CancellationToken,
    ) -> Result<(Value, Option<u64>), ApiError> {
        let generation = self.queries.generation();
        if let Some(hit) = self.queries.get(key) {
            tracing::trace!(key, "Query cache hit");
            return Ok((hit, Some(generation)));
        }

        let data = self.base.execute_cancellable(&request, cancel).await?;
        let current = self.queries.insert(key, data.clone(), tags, generation);
        Ok((data, current.then_some(generation)))
    }

    /// [`query`](Self::query) backed by the persisted TTL cache: a
    /// successful response is also written under `persist_key`, and when
    /// the server is unreachable a still-valid persisted copy is served.
    pub async fn query_persisted(
        &self,
        key: &str,
        persist_key: &str,
        request: ApiRequest,
        tags: Vec<CacheTag>,
    ) -> Result<Value, ApiError> {
        match self.fetch(key, request, tags, &CancellationToken::new()).await {
            Ok((data, None)) => {
                tracing::debug!(key = persist_key, "Session changed mid-request, not persisting result");
                Ok(data)
            }
            Ok((data, Some(generation))) => {
                if let Err(e) = self.persisted.set(persist_key, &data, None).await {
                    tracing::warn!(key = persist_key, error = %e, "Failed to persist query result");
                }
                // A logout that landed during the write must not leave it behind.
                if self.queries.generation() != generation {
                    if let Err(e) = self.persisted.invalidate(persist_key).await {
                        tracing::warn!(key = persist_key, error = %e, "Failed to drop stale persisted result");
                    }
                }
                Ok(data)
            }
            Err(err) if err.is_offline() => match self.persisted.get::<Value>(persist_key).await {
                Some(data) => {
                    tracing::info!(key = persist_key, "Serving persisted copy while offline");
                    Ok(data)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Send a mutation and invalidate `invalidates` on success.
    pub async fn mutate(
        &self,
        request: ApiRequest,
        invalidates: &[CacheTag],
    ) -> Result<Value, ApiError> {
        let data = self.base.execute(&request).await?;
        self.queries.invalidate(invalidates);
        Ok(data)
    }

    /// [`mutate`](Self::mutate), queueing the request for later replay
    /// when the server cannot be reached.
    pub async fn mutate_or_queue(
        &self,
        request: ApiRequest,
        invalidates: &[CacheTag],
    ) -> Result<Submission, ApiError> {
        match self.mutate(request.clone(), invalidates).await {
            Ok(data) => Ok(Submission::Sent(data)),
            Err(err) if err.is_offline() => {
                let queued = self
                    .offline
                    .enqueue(request.method.as_str(), &request.path, request.body)
                    .await
                    .map_err(|e| ApiError::Fetch(format!("could not queue request: {e}")))?;
                Ok(Submission::Queued(queued.id))
            }
            Err(err) => Err(err),
        }
    }

    /// Replay queued requests oldest first.
    ///
    /// Sent and rejected requests leave the queue; requests that still
    /// cannot reach the server stay for the next flush.
    pub async fn flush_offline_queue(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let pending = self.offline.pending().await;
        if pending.is_empty() {
            return report;
        }
        tracing::info!(count = pending.len(), "Replaying offline requests");

        for queued in pending {
            let method = match Method::from_str(&queued.method) {
                Ok(method) => method,
                Err(reason) => {
                    tracing::warn!(id = %queued.id, %reason, "Dropping unreplayable offline request");
                    self.forget(queued.id).await;
                    report.dropped += 1;
                    continue;
                }
            };

            let mut request = ApiRequest::new(method, queued.path.clone()).background();
            request.body = queued.body.clone();

            match self.base.execute(&request).await {
                Ok(_) => {
                    self.forget(queued.id).await;
                    self.queries.invalidate(&tags_for_path(&queued.path));
                    report.sent += 1;
                }
                Err(err) if err.is_retryable() => {
                    tracing::debug!(id = %queued.id, error = %err, "Offline request still failing, keeping it");
                    report.kept += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %queued.id, path = %queued.path, error = %err, "Offline request rejected, dropping it");
                    self.forget(queued.id).await;
                    report.dropped += 1;
                }
            }
        }

        tracing::info!(sent = report.sent, dropped = report.dropped, kept = report.kept, "Offline replay finished");
        report
    }

    async fn forget(&self, id: Uuid) {
        if let Err(e) = self.offline.remove(id).await {
            tracing::error!(%id, error = %e, "Failed to remove offline request");
        }
    }
}

/// Tags a replayed write may have staled. Queued requests only keep
/// their path, so this is derived from the resource it targets.
fn tags_for_path(path: &str) -> Vec<CacheTag> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["leads", id, "documents"] => vec![CacheTag::Document, CacheTag::LeadItem(id.to_string())],
        ["leads", ..] => vec![CacheTag::Lead],
        ["quotations", ..] => vec![CacheTag::Quotation, CacheTag::Lead],
        ["auth", "profile"] => vec![CacheTag::Profile],
        _ => Vec::new(),
    }
}

/// Decode a response body into `T`.
pub fn decode<T: DeserializeOwned>(data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
}
