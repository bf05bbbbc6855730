//! Persistence collaborators of the ink core.
//!
//! The core never owns a storage format. It talks to an [`InkPersistence`]
//! for strokes and an [`AttemptDirectory`] for card labels, both async.

mod memory;
mod outbox;

#[cfg(not(target_arch = "wasm32"))]
mod file;

pub use memory::{MemoryAttemptDirectory, MemoryInkStorage};
pub use outbox::{
    Outbox, PersistOp, SyncError, SyncOp, hydrate_context, persist_ops_for_redo, persist_ops_for_undo,
};

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileInkStorage;

use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// An attempt known to the host, for labelling its background card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEntry {
    pub attempt_id: AttemptId,
    pub problem_label: String,
}

/// Durable stroke storage.
///
/// Each mutating call is issued exactly once per corresponding store command.
/// Note: On native platforms, implementations must be Send + Sync.
#[cfg(not(target_arch = "wasm32"))]
pub trait InkPersistence: Send + Sync {
    /// All strokes of one (session, document) pair.
    fn list_by_session_and_document(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<Stroke>>>;

    /// All strokes of one attempt, across documents.
    fn list_by_attempt(&self, attempt_id: &AttemptId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>>;

    /// Insert or replace a stroke.
    fn save(&self, stroke: &Stroke) -> BoxFuture<'_, StorageResult<()>>;

    /// Remove strokes by id.
    fn delete(&self, strokes: &[Stroke]) -> BoxFuture<'_, StorageResult<()>>;

    /// Shift every stored stroke of an attempt.
    fn translate_attempt(&self, attempt_id: &AttemptId, dx: f64, dy: f64) -> BoxFuture<'_, StorageResult<()>>;
}

/// Durable stroke storage (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait InkPersistence {
    /// All strokes of one (session, document) pair.
    fn list_by_session_and_document(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<Stroke>>>;

    /// All strokes of one attempt, across documents.
    fn list_by_attempt(&self, attempt_id: &AttemptId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>>;

    /// Insert or replace a stroke.
    fn save(&self, stroke: &Stroke) -> BoxFuture<'_, StorageResult<()>>;

    /// Remove strokes by id.
    fn delete(&self, strokes: &[Stroke]) -> BoxFuture<'_, StorageResult<()>>;

    /// Shift every stored stroke of an attempt.
    fn translate_attempt(&self, attempt_id: &AttemptId, dx: f64, dy: f64) -> BoxFuture<'_, StorageResult<()>>;
}

/// Read-only directory of attempts, used for card labels.
#[cfg(not(target_arch = "wasm32"))]
pub trait AttemptDirectory: Send + Sync {
    fn list_attempts(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<AttemptEntry>>>;
}

/// Read-only directory of attempts (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait AttemptDirectory {
    fn list_attempts(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<AttemptEntry>>>;
}
