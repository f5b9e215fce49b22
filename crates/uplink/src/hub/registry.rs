//! Connected, identity-verified validators.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::info;
use uuid::Uuid;

use crate::protocol::ValidatorBound;

/// The connection's writer is gone, so nothing more can be sent on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Writable end of one validator connection.
///
/// The outbound queue is unbounded so a dispatch tick never drops requests
/// for a validator that is alive but has not drained the previous ones yet.
/// Cloning shares the queue; equality is by connection id.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<ValidatorBound>,
    superseded: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ValidatorBound>) -> Self {
        Self { id: Uuid::new_v4(), tx, superseded: Arc::new(Notify::new()) }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a message without waiting.
    ///
    /// Safe to call while the connection is closing; a dead connection just
    /// yields `ConnectionClosed`.
    pub fn send(&self, message: ValidatorBound) -> Result<(), ConnectionClosed> {
        self.tx.send(message).map_err(|_| ConnectionClosed)
    }

    /// Tell the connection's owner that a newer connection took its identity
    pub fn supersede(&self) {
        self.superseded.notify_one();
    }

    /// Resolves once `supersede` has been called, even if it was called first
    pub async fn superseded(&self) {
        self.superseded.notified().await;
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Registry entry for an admitted validator
#[derive(Debug, Clone)]
pub struct ConnectedValidator {
    pub validator_id: String,
    /// Hex public key verified at signup
    pub public_key: String,
    pub handle: ConnectionHandle,
}

/// Live validator connections, in admission order
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    entries: Mutex<Vec<ConnectedValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a validator on `handle`. Returns `false` if the handle is already admitted.
    ///
    /// A validator id holds at most one entry. An older connection for the
    /// same id is dropped from the registry and told it was superseded.
    pub async fn admit(
        &self,
        validator_id: String,
        public_key: String,
        handle: ConnectionHandle,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.handle == handle) {
            return false;
        }

        if let Some(index) = entries.iter().position(|e| e.validator_id == validator_id) {
            let previous = entries.remove(index);
            previous.handle.supersede();
            info!(%validator_id, connection = %previous.handle.id(), "Superseded older connection");
        }

        entries.push(ConnectedValidator { validator_id, public_key, handle });
        true
    }

    /// Remove whatever entry belongs to `handle`; absent handles are a no-op
    pub async fn remove(&self, handle: &ConnectionHandle) -> Option<ConnectedValidator> {
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|e| &e.handle == handle)?;
        Some(entries.remove(index))
    }

    /// Consistent copy of the admitted validators
    pub async fn snapshot(&self) -> Vec<ConnectedValidator> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
