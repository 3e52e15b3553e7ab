//! Durable FIFO of write requests made while the device was offline.
//!
//! The whole queue is one JSON array under [`keys::OFFLINE_QUEUE`]. A
//! process-local mutex serialises the read-modify-write cycles so two
//! concurrent enqueues cannot drop each other's entries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solarcare_core::types::EpochMillis;
use solarcare_core::Clock;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StorageError;
use crate::helper::StorageHelper;
use crate::keys;

/// A request waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    pub id: Uuid,
    /// HTTP method name, e.g. `"POST"`.
    pub method: String,
    /// Path relative to the API base URL.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    pub queued_at: EpochMillis,
}

#[derive(Clone)]
pub struct OfflineQueue {
    storage: StorageHelper,
    clock: Arc<dyn Clock>,
    lock: Arc<Mutex<()>>,
}

impl OfflineQueue {
    pub fn new(storage: StorageHelper, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load(&self) -> Vec<QueuedRequest> {
        self.storage
            .get(keys::OFFLINE_QUEUE)
            .await
            .unwrap_or_default()
    }

    /// Append a request to the tail of the queue.
    pub async fn enqueue(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<QueuedRequest, StorageError> {
        let _guard = self.lock.lock().await;
        let mut queue = self.load().await;

        let request = QueuedRequest {
            id: Uuid::new_v4(),
            method: method.to_uppercase(),
            path: path.to_string(),
            body,
            queued_at: self.clock.now_millis(),
        };
        queue.push(request.clone());
        self.storage.set(keys::OFFLINE_QUEUE, &queue).await?;

        tracing::info!(id = %request.id, method = %request.method, path, depth = queue.len(), "Queued offline request");
        Ok(request)
    }

    /// Snapshot of the queue, oldest first.
    pub async fn pending(&self) -> Vec<QueuedRequest> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Remove one request. Returns whether it was present.
    pub async fn remove(&self, id: Uuid) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        let mut queue = self.load().await;
        let before = queue.len();
        queue.retain(|r| r.id != id);
        if queue.len() == before {
            return Ok(false);
        }
        self.storage.set(keys::OFFLINE_QUEUE, &queue).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.storage.remove(keys::OFFLINE_QUEUE).await
    }
}
