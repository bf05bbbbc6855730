//! inklayer Core Library
//!
//! Platform-agnostic freehand ink annotation engine: stroke model, outline
//! generation, the ink store with its command history, the viewport transform
//! and the pointer gesture controller that drives a persisted and a live layer.

pub mod clock;
pub mod config;
pub mod geometry;
pub mod input;
pub mod outline;
pub mod overlay;
pub mod paint;
pub mod storage;
pub mod store;
pub mod stroke;
pub mod viewport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, InkConfig};
pub use geometry::{BoundingBox, squared_distance};
pub use input::{PointerInput, PointerKind};
pub use outline::{OutlineOptions, stroke_outline};
pub use overlay::{AttemptCard, FramePainted, FrameRequester, GestureMode, GestureOutcome, Overlay};
pub use paint::{PaintOp, PaintRecorder, Painter, Shadow, paint_stroke};
pub use storage::{
    AttemptDirectory, AttemptEntry, InkPersistence, MemoryAttemptDirectory, MemoryInkStorage,
    Outbox, PersistOp, StorageError, StorageResult, SyncError,
};
pub use store::{Command, InkContext, InkStore, SharedStore, StoreEvent, SubscriptionId};
pub use stroke::{AttemptId, Brush, DocumentId, InkPoint, InkTool, SessionId, Stroke, StrokeId};
pub use viewport::Viewport;

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileInkStorage;
