//! Queue of persistence side effects.
//!
//! Pointer handlers are synchronous and update the store optimistically; the
//! matching persistence calls are queued here and performed when the host
//! flushes. A failed call is reported once and not retried, and the store is
//! left as it is.

use super::{InkPersistence, StorageError, StorageResult};
use crate::store::{Command, InkContext, SharedStore};
use crate::stroke::{AttemptId, Stroke};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Kind of persistence call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Load,
    Save,
    Delete,
    TranslateAttempt,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOp::Load => "load",
            SyncOp::Save => "save",
            SyncOp::Delete => "delete",
            SyncOp::TranslateAttempt => "translateAttempt",
        })
    }
}

/// A persistence call that failed. Visible state already reflects the
/// change; the host decides whether to tell the user or retry the action.
#[derive(Debug, Error)]
#[error("Ink {op} failed: {source}")]
pub struct SyncError {
    pub op: SyncOp,
    #[source]
    pub source: StorageError,
}

/// One queued persistence call.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Save(Stroke),
    Delete(Vec<Stroke>),
    TranslateAttempt {
        attempt_id: AttemptId,
        dx: f64,
        dy: f64,
    },
}

impl PersistOp {
    pub fn kind(&self) -> SyncOp {
        match self {
            PersistOp::Save(_) => SyncOp::Save,
            PersistOp::Delete(_) => SyncOp::Delete,
            PersistOp::TranslateAttempt { .. } => SyncOp::TranslateAttempt,
        }
    }

    /// Perform the call against `persistence`.
    pub async fn run(&self, persistence: &dyn InkPersistence) -> StorageResult<()> {
        match self {
            PersistOp::Save(stroke) => persistence.save(stroke).await,
            PersistOp::Delete(strokes) => persistence.delete(strokes).await,
            PersistOp::TranslateAttempt { attempt_id, dx, dy } => {
                persistence.translate_attempt(attempt_id, *dx, *dy).await
            }
        }
    }
}

/// Side effects of undoing `command`, in order. Undoing a multi-stroke delete
/// saves every restored stroke.
pub fn persist_ops_for_undo(command: &Command) -> Vec<PersistOp> {
    match command {
        Command::Add(stroke) => vec![PersistOp::Delete(vec![stroke.clone()])],
        Command::Delete(strokes) => strokes.iter().cloned().map(PersistOp::Save).collect(),
        Command::TranslateAttempt { attempt_id, dx, dy } => vec![PersistOp::TranslateAttempt {
            attempt_id: attempt_id.clone(),
            dx: -dx,
            dy: -dy,
        }],
    }
}

/// Side effects of redoing `command`.
pub fn persist_ops_for_redo(command: &Command) -> Vec<PersistOp> {
    let op = match command {
        Command::Add(stroke) => PersistOp::Save(stroke.clone()),
        Command::Delete(strokes) => PersistOp::Delete(strokes.clone()),
        Command::TranslateAttempt { attempt_id, dx, dy } => PersistOp::TranslateAttempt {
            attempt_id: attempt_id.clone(),
            dx: *dx,
            dy: *dy,
        },
    };
    vec![op]
}

/// Shared FIFO of pending persistence calls.
///
/// Cloning yields another handle to the same queue, so the overlay can push
/// while the host flushes.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Rc<RefCell<VecDeque<PersistOp>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: PersistOp) {
        log::debug!("Queued ink {}", op.kind());
        self.queue.borrow_mut().push_back(op);
    }

    pub fn extend(&self, ops: impl IntoIterator<Item = PersistOp>) {
        for op in ops {
            self.push(op);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Snapshot of the queued calls, oldest first.
    pub fn pending(&self) -> Vec<PersistOp> {
        self.queue.borrow().iter().cloned().collect()
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    /// Perform queued calls in order until the queue is empty or one fails.
    ///
    /// Returns how many calls succeeded. The failing call is dropped and
    /// reported; calls behind it stay queued for the next flush.
    pub async fn flush(&self, persistence: &dyn InkPersistence) -> Result<usize, SyncError> {
        let mut done = 0;
        loop {
            // The borrow ends before the await so pushes during a flush are fine.
            let next = self.queue.borrow_mut().pop_front();
            let Some(op) = next else {
                return Ok(done);
            };
            if let Err(source) = op.run(persistence).await {
                log::error!("Ink {} failed: {}", op.kind(), source);
                return Err(SyncError { op: op.kind(), source });
            }
            done += 1;
        }
    }
}

/// Switch `store` to `context` and load its strokes.
///
/// Returns `Ok(false)` when the store moved to another context while the load
/// was pending; the loaded strokes are discarded in that case.
pub async fn hydrate_context(
    store: &SharedStore,
    persistence: &dyn InkPersistence,
    context: InkContext,
) -> Result<bool, SyncError> {
    store.borrow_mut().set_context(Some(context.clone()));
    let strokes = persistence
        .list_by_session_and_document(&context.session_id, &context.document_id)
        .await
        .map_err(|source| {
            log::error!("Ink load failed: {}", source);
            SyncError { op: SyncOp::Load, source }
        })?;

    let mut store = store.borrow_mut();
    if store.context() != Some(&context) {
        log::debug!("Discarding {} strokes loaded for a stale context", strokes.len());
        return Ok(false);
    }
    store.hydrate(strokes);
    Ok(true)
}
