//! In-memory persistence backends.

use super::{AttemptDirectory, AttemptEntry, BoxFuture, InkPersistence, StorageError, StorageResult};
use crate::clock::now_ms;
use crate::stroke::{AttemptId, DocumentId, SessionId, Stroke, StrokeId};
use std::collections::HashMap;
use std::sync::RwLock;

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

/// In-memory stroke storage for testing and ephemeral use.
#[derive(Default)]
pub struct MemoryInkStorage {
    strokes: RwLock<HashMap<StrokeId, Stroke>>,
}

impl MemoryInkStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with `strokes`.
    pub fn with_strokes(strokes: impl IntoIterator<Item = Stroke>) -> Self {
        let map = strokes.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            strokes: RwLock::new(map),
        }
    }

    /// Number of stored strokes.
    pub fn len(&self) -> usize {
        self.strokes.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect_sorted(&self, keep: impl Fn(&Stroke) -> bool) -> StorageResult<Vec<Stroke>> {
        let map = self.strokes.read().map_err(lock_error)?;
        let mut out: Vec<Stroke> = map.values().filter(|s| keep(s)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

impl InkPersistence for MemoryInkStorage {
    fn list_by_session_and_document(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let session_id = session_id.clone();
        let document_id = document_id.clone();
        Box::pin(async move {
            self.collect_sorted(|s| s.session_id == session_id && s.document_id == document_id)
        })
    }

    fn list_by_attempt(&self, attempt_id: &AttemptId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let attempt_id = attempt_id.clone();
        Box::pin(async move { self.collect_sorted(|s| s.attempt_id == attempt_id) })
    }

    fn save(&self, stroke: &Stroke) -> BoxFuture<'_, StorageResult<()>> {
        let stroke = stroke.clone();
        Box::pin(async move {
            let mut map = self.strokes.write().map_err(lock_error)?;
            map.insert(stroke.id.clone(), stroke);
            Ok(())
        })
    }

    fn delete(&self, strokes: &[Stroke]) -> BoxFuture<'_, StorageResult<()>> {
        let ids: Vec<StrokeId> = strokes.iter().map(|s| s.id.clone()).collect();
        Box::pin(async move {
            let mut map = self.strokes.write().map_err(lock_error)?;
            for id in &ids {
                map.remove(id);
            }
            Ok(())
        })
    }

    fn translate_attempt(&self, attempt_id: &AttemptId, dx: f64, dy: f64) -> BoxFuture<'_, StorageResult<()>> {
        let attempt_id = attempt_id.clone();
        Box::pin(async move {
            let now = now_ms();
            let mut map = self.strokes.write().map_err(lock_error)?;
            for stroke in map.values_mut().filter(|s| s.attempt_id == attempt_id) {
                stroke.translate(dx, dy, now);
            }
            Ok(())
        })
    }
}

/// In-memory attempt directory.
#[derive(Default)]
pub struct MemoryAttemptDirectory {
    entries: RwLock<Vec<(SessionId, DocumentId, AttemptEntry)>>,
}

impl MemoryAttemptDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attempt label for a (session, document) pair.
    pub fn insert(
        &self,
        session_id: impl Into<SessionId>,
        document_id: impl Into<DocumentId>,
        attempt_id: impl Into<AttemptId>,
        problem_label: impl Into<String>,
    ) {
        let entry = AttemptEntry {
            attempt_id: attempt_id.into(),
            problem_label: problem_label.into(),
        };
        match self.entries.write() {
            Ok(mut entries) => entries.push((session_id.into(), document_id.into(), entry)),
            Err(e) => log::error!("Attempt directory lock poisoned: {}", e),
        }
    }
}

impl AttemptDirectory for MemoryAttemptDirectory {
    fn list_attempts(
        &self,
        session_id: &SessionId,
        document_id: &DocumentId,
    ) -> BoxFuture<'_, StorageResult<Vec<AttemptEntry>>> {
        let session_id = session_id.clone();
        let document_id = document_id.clone();
        Box::pin(async move {
            let entries = self.entries.read().map_err(lock_error)?;
            Ok(entries
                .iter()
                .filter(|(s, d, _)| *s == session_id && *d == document_id)
                .map(|(_, _, e)| e.clone())
                .collect())
        })
    }
}
