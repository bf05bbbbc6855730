//! Gesture controller for the ink layers.
//!
//! One pointer at a time is interpreted as drawing, erasing, holding or
//! dragging. Edits go through the shared [`InkStore`](crate::store::InkStore)
//! immediately; the matching persistence calls are queued on an [`Outbox`]
//! for the host to flush. Two layers are kept: a persisted layer with all
//! committed ink plus the cards of other attempts, and a live layer with the
//! in-progress stroke and the eraser ring.

mod paint;

pub use paint::AttemptCard;

use crate::config::InkConfig;
use crate::geometry::{BoundingBox, squared_distance};
use crate::input::{PointerInput, PointerKind};
use crate::paint::RepaintGate;
use crate::storage::{
    AttemptDirectory, Outbox, PersistOp, StorageResult, persist_ops_for_redo, persist_ops_for_undo,
};
use crate::store::{Command, SharedStore, StoreEvent, SubscriptionId};
use crate::stroke::{AttemptId, InkPoint, InkTool, Stroke, StrokeId};
use crate::viewport::Viewport;
use kurbo::{Point, Size, Vec2};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Label used for attempts the directory does not know.
pub const FALLBACK_LABEL: &str = "Attempt";

/// Host hook that schedules a call to [`Overlay::render_frame`] on the next
/// animation frame.
pub trait FrameRequester {
    fn request_frame(&self);
}

impl<F: Fn()> FrameRequester for F {
    fn request_frame(&self) {
        self()
    }
}

/// Observable gesture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureMode {
    #[default]
    Idle,
    Drawing,
    Erasing,
    Holding,
    Dragging,
}

/// What a pointer event did.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    /// Not handled: another pointer is active, nothing was hit, or no attempt is active.
    Ignored,
    /// A gesture began in the given mode.
    Started(GestureMode),
    /// The event was absorbed without changing anything (e.g. below the sampling distance).
    Skipped,
    /// A point was sampled or the drag moved.
    Updated,
    /// An eraser pass removed this stroke.
    Erased(StrokeId),
    /// A stroke was committed.
    Committed(StrokeId),
    /// A draw gesture ended with too few points.
    Discarded,
    /// A pending hold was cancelled by movement; the attempt stays selected.
    HoldCancelled,
    /// A drag ended with a non-zero net move.
    Translated {
        attempt_id: AttemptId,
        dx: f64,
        dy: f64,
    },
    /// The gesture ended without further effect.
    Ended,
    /// The gesture was interrupted.
    Cancelled,
}

#[derive(Debug, Clone)]
enum Gesture {
    Drawing {
        points: Vec<InkPoint>,
        last: Point,
    },
    Erasing {
        radius: f64,
        cursor: Point,
    },
    Holding {
        attempt_id: AttemptId,
        start: Point,
        deadline_ms: i64,
    },
    Dragging {
        attempt_id: AttemptId,
        last: Point,
        total: Vec2,
    },
}

impl Gesture {
    fn mode(&self) -> GestureMode {
        match self {
            Gesture::Drawing { .. } => GestureMode::Drawing,
            Gesture::Erasing { .. } => GestureMode::Erasing,
            Gesture::Holding { .. } => GestureMode::Holding,
            Gesture::Dragging { .. } => GestureMode::Dragging,
        }
    }
}

/// The single tracked pointer.
#[derive(Debug, Clone)]
struct ActivePointer {
    pointer_id: u64,
    gesture: Gesture,
}

#[derive(Default)]
struct LayerGates {
    persisted: RepaintGate,
    live: RepaintGate,
    context_changed: bool,
}

/// Repaint state shared with the store subscription.
#[derive(Default)]
struct FrameState {
    gates: RefCell<LayerGates>,
    /// A frame was requested and `render_frame` has not run since.
    scheduled: Cell<bool>,
    requester: RefCell<Option<Rc<dyn FrameRequester>>>,
}

impl FrameState {
    fn invalidate(&self, persisted: bool, live: bool) {
        {
            let mut gates = self.gates.borrow_mut();
            if persisted {
                gates.persisted.invalidate();
            }
            if live {
                gates.live.invalidate();
            }
        }
        self.schedule();
    }

    /// Request a frame if a layer is dirty and none is outstanding.
    fn schedule(&self) {
        if self.scheduled.get() {
            return;
        }
        let dirty = {
            let gates = self.gates.borrow();
            gates.persisted.is_pending() || gates.live.is_pending()
        };
        if !dirty {
            return;
        }
        // Without a requester the dirty layers wait for one to be attached.
        let requester = self.requester.borrow().clone();
        if let Some(requester) = requester {
            self.scheduled.set(true);
            requester.request_frame();
        }
    }

    /// Consume the dirty flags for one frame.
    fn begin_frame(&self) -> (bool, bool) {
        self.scheduled.set(false);
        let mut gates = self.gates.borrow_mut();
        (gates.persisted.take(), gates.live.take())
    }

    fn on_store_event(&self, event: StoreEvent) {
        match event {
            StoreEvent::ContextChanged => {
                self.gates.borrow_mut().context_changed = true;
                self.invalidate(true, true);
            }
            StoreEvent::Hydrated | StoreEvent::StrokesChanged | StoreEvent::SelectionChanged => {
                self.invalidate(true, false)
            }
            // Active attempt changes which cards are shown.
            StoreEvent::SettingsChanged => self.invalidate(true, true),
            StoreEvent::HistoryChanged => {}
        }
    }
}

/// Which layers [`Overlay::render_frame`] repainted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramePainted {
    pub persisted: bool,
    pub live: bool,
}

/// Pointer gesture controller driving the persisted and live ink layers.
pub struct Overlay {
    store: SharedStore,
    config: InkConfig,
    viewport: Viewport,
    device_pixel_ratio: f64,
    container: Size,
    active: Option<ActivePointer>,
    outbox: Outbox,
    labels: HashMap<AttemptId, String>,
    frame: Rc<FrameState>,
    subscription: Option<SubscriptionId>,
}

impl Overlay {
    /// Create an overlay over `store`. The overlay subscribes to the store to
    /// repaint when ink changes, and unsubscribes when dropped.
    pub fn new(store: SharedStore, config: InkConfig) -> Self {
        let frame = Rc::new(FrameState::default());
        // Both layers start dirty so the first frame paints them.
        frame.invalidate(true, true);
        let listener = Rc::clone(&frame);
        let subscription = store
            .borrow_mut()
            .subscribe(move |event| listener.on_store_event(event));
        let viewport = Viewport::default().with_min_ratio(config.min_ratio);
        Self {
            store,
            config,
            viewport,
            device_pixel_ratio: 1.0,
            container: Size::new(1.0, 1.0),
            active: None,
            outbox: Outbox::new(),
            labels: HashMap::new(),
            frame,
            subscription: Some(subscription),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &InkConfig {
        &self.config
    }

    /// Handle to the queue of pending persistence calls.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    pub fn set_frame_requester(&mut self, requester: Rc<dyn FrameRequester>) {
        *self.frame.requester.borrow_mut() = Some(requester);
        self.frame.schedule();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Replace pan and zoom. The zoom clamp always comes from the config.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        let viewport = viewport.with_min_ratio(self.config.min_ratio);
        if self.viewport != viewport {
            self.viewport = viewport;
            self.frame.invalidate(true, true);
        }
    }

    /// Device pixels per container pixel of the backing layers.
    pub fn set_device_pixel_ratio(&mut self, dpr: f64) {
        let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
        if self.device_pixel_ratio != dpr {
            self.device_pixel_ratio = dpr;
            self.frame.invalidate(true, true);
        }
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// Size of the drawing surface in container pixels.
    pub fn set_container_size(&mut self, size: Size) {
        let size = Size::new(size.width.max(1.0), size.height.max(1.0));
        if self.container != size {
            self.container = size;
            self.frame.invalidate(true, true);
        }
    }

    pub fn container_size(&self) -> Size {
        self.container
    }

    /// Set the attempt new ink belongs to. Clearing it also clears the selection.
    pub fn set_active_attempt(&mut self, attempt_id: Option<AttemptId>) {
        let mut store = self.store.borrow_mut();
        let clear = attempt_id.is_none();
        store.set_active_attempt_id(attempt_id);
        if clear {
            store.clear_selection();
        }
    }

    pub fn mode(&self) -> GestureMode {
        self.active
            .as_ref()
            .map(|a| a.gesture.mode())
            .unwrap_or_default()
    }

    /// Points of the stroke being drawn, if any.
    pub fn draft_points(&self) -> &[InkPoint] {
        match &self.active {
            Some(ActivePointer {
                gesture: Gesture::Drawing { points, .. },
                ..
            }) => points,
            _ => &[],
        }
    }

    // --- labels ---

    /// Replace the card labels.
    pub fn set_attempt_labels(&mut self, labels: HashMap<AttemptId, String>) {
        self.labels = labels;
        self.frame.invalidate(true, false);
    }

    /// Reload card labels for the store's current context. Hosts call this
    /// when the context or the active attempt changes.
    pub async fn refresh_labels(&mut self, directory: &dyn AttemptDirectory) -> StorageResult<()> {
        let context = self.store.borrow().context().cloned();
        let Some(context) = context else {
            self.set_attempt_labels(HashMap::new());
            return Ok(());
        };
        let entries = directory
            .list_attempts(&context.session_id, &context.document_id)
            .await?;
        let labels = entries
            .into_iter()
            .map(|e| (e.attempt_id, e.problem_label))
            .collect();
        self.set_attempt_labels(labels);
        Ok(())
    }

    pub fn label_for(&self, attempt_id: &AttemptId) -> &str {
        self.labels
            .get(attempt_id)
            .map(String::as_str)
            .unwrap_or(FALLBACK_LABEL)
    }

    // --- history ---

    /// Undo the last command and queue its persistence side effects.
    pub fn undo(&mut self) -> Option<Command> {
        let command = self.store.borrow_mut().undo()?;
        self.outbox.extend(persist_ops_for_undo(&command));
        Some(command)
    }

    /// Redo the last undone command and queue its persistence side effects.
    pub fn redo(&mut self) -> Option<Command> {
        let command = self.store.borrow_mut().redo()?;
        self.outbox.extend(persist_ops_for_redo(&command));
        Some(command)
    }

    /// Double click/tap on the surface: drop the selection.
    pub fn double_click(&mut self) {
        self.store.borrow_mut().clear_selection();
    }

    // --- pointer events ---

    pub fn pointer_down(&mut self, input: &PointerInput) -> GestureOutcome {
        self.sync_context();
        if let Some(active) = &self.active {
            if active.pointer_id != input.pointer_id {
                log::warn!(
                    "Ignoring pointer {} while pointer {} is active",
                    input.pointer_id,
                    active.pointer_id
                );
            }
            return GestureOutcome::Ignored;
        }

        let world = self.viewport.to_world(input.position);

        match input.kind {
            PointerKind::Pen => self.begin_ink(input, world),
            PointerKind::Mouse => match self.hit_other_attempt(world) {
                Some(attempt_id) => self.begin_select(input, world, attempt_id),
                None => self.begin_ink(input, world),
            },
            PointerKind::Touch => match self.hit_other_attempt(world) {
                Some(attempt_id) => self.begin_select(input, world, attempt_id),
                None => GestureOutcome::Ignored,
            },
        }
    }

    pub fn pointer_move(&mut self, input: &PointerInput) -> GestureOutcome {
        self.sync_context();
        if !self.is_active_pointer(input.pointer_id) {
            return GestureOutcome::Ignored;
        }
        self.tick(input.timestamp_ms);

        let world = self.viewport.to_world(input.position);
        let ratio = self.viewport.ratio();
        let min_dist = self.config.px_to_world(self.config.min_sample_distance_px, ratio);
        let hold_cancel = self.config.px_to_world(self.config.hold_cancel_px, ratio);

        let Some(active) = self.active.as_mut() else {
            return GestureOutcome::Ignored;
        };

        match &mut active.gesture {
            Gesture::Drawing { points, last } => {
                if squared_distance(last.x, last.y, world.x, world.y) < min_dist * min_dist {
                    return GestureOutcome::Skipped;
                }
                points.push(InkPoint::new(
                    world.x,
                    world.y,
                    InkPoint::normalize_pressure(input.pressure),
                    input.timestamp_ms,
                ));
                *last = world;
                self.frame.invalidate(false, true);
                GestureOutcome::Updated
            }
            Gesture::Erasing { radius, cursor } => {
                *cursor = world;
                *radius = self.config.eraser_radius_world(ratio);
                let radius = *radius;
                let outcome = match self.erase_at(world, radius) {
                    Some(id) => GestureOutcome::Erased(id),
                    None => GestureOutcome::Updated,
                };
                self.frame.invalidate(false, true);
                outcome
            }
            Gesture::Holding { start, .. } => {
                if squared_distance(start.x, start.y, world.x, world.y) > hold_cancel * hold_cancel {
                    log::debug!("Hold cancelled by movement");
                    self.active = None;
                    self.frame.invalidate(true, false);
                    GestureOutcome::HoldCancelled
                } else {
                    GestureOutcome::Skipped
                }
            }
            Gesture::Dragging {
                attempt_id,
                last,
                total,
            } => {
                let delta = world - *last;
                if delta == Vec2::ZERO {
                    return GestureOutcome::Skipped;
                }
                *last = world;
                *total += delta;
                let attempt_id = attempt_id.clone();
                self.store
                    .borrow_mut()
                    .apply_translation(&attempt_id, delta.x, delta.y);
                GestureOutcome::Updated
            }
        }
    }

    pub fn pointer_up(&mut self, input: &PointerInput) -> GestureOutcome {
        self.sync_context();
        if !self.is_active_pointer(input.pointer_id) {
            return GestureOutcome::Ignored;
        }
        let Some(active) = self.active.take() else {
            return GestureOutcome::Ignored;
        };

        match active.gesture {
            Gesture::Drawing { points, .. } => {
                self.frame.invalidate(false, true);
                self.commit_stroke(points)
            }
            Gesture::Erasing { .. } => {
                self.frame.invalidate(false, true);
                GestureOutcome::Ended
            }
            Gesture::Holding { .. } => {
                self.frame.invalidate(true, false);
                GestureOutcome::Ended
            }
            Gesture::Dragging {
                attempt_id, total, ..
            } => {
                self.frame.invalidate(true, false);
                if total == Vec2::ZERO {
                    return GestureOutcome::Ended;
                }
                log::debug!(
                    "Moved attempt {} by ({}, {})",
                    attempt_id,
                    total.x,
                    total.y
                );
                self.outbox.push(PersistOp::TranslateAttempt {
                    attempt_id: attempt_id.clone(),
                    dx: total.x,
                    dy: total.y,
                });
                self.store.borrow_mut().push_command(Command::TranslateAttempt {
                    attempt_id: attempt_id.clone(),
                    dx: total.x,
                    dy: total.y,
                });
                GestureOutcome::Translated {
                    attempt_id,
                    dx: total.x,
                    dy: total.y,
                }
            }
        }
    }

    /// Device or OS interruption. Uncommitted ink and pending holds are
    /// dropped; a partially applied drag stays where it is.
    pub fn pointer_cancel(&mut self, input: &PointerInput) -> GestureOutcome {
        if !self.is_active_pointer(input.pointer_id) {
            return GestureOutcome::Ignored;
        }
        if let Some(active) = self.active.take() {
            log::debug!("Pointer {} cancelled during {:?}", active.pointer_id, active.gesture.mode());
        }
        self.frame.invalidate(true, true);
        GestureOutcome::Cancelled
    }

    /// Drop any gesture in progress without committing it.
    pub fn reset_gesture(&mut self) {
        if self.active.take().is_some() {
            self.frame.invalidate(true, true);
        }
    }

    /// Advance timers. Turns a pending hold into a drag once its delay has
    /// passed; returns whether that happened.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let Gesture::Holding {
            attempt_id,
            start,
            deadline_ms,
        } = &active.gesture
        else {
            return false;
        };
        if now_ms < *deadline_ms {
            return false;
        }
        log::debug!("Hold elapsed, dragging attempt {}", attempt_id);
        let dragging = Gesture::Dragging {
            attempt_id: attempt_id.clone(),
            last: *start,
            total: Vec2::ZERO,
        };
        active.gesture = dragging;
        self.frame.invalidate(true, false);
        true
    }

    // --- internals ---

    fn is_active_pointer(&self, pointer_id: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.pointer_id == pointer_id)
    }

    /// A context switch abandons whatever gesture was in progress.
    fn sync_context(&mut self) {
        let changed = std::mem::take(&mut self.frame.gates.borrow_mut().context_changed);
        if changed {
            self.active = None;
            self.labels.clear();
        }
    }

    fn begin_ink(&mut self, input: &PointerInput, world: Point) -> GestureOutcome {
        let (has_attempt, brush) = {
            let store = self.store.borrow();
            (store.active_attempt_id().is_some(), store.brush())
        };
        if !has_attempt {
            return GestureOutcome::Ignored;
        }

        if brush.is_eraser() {
            let radius = self.config.eraser_radius_world(self.viewport.ratio());
            self.active = Some(ActivePointer {
                pointer_id: input.pointer_id,
                gesture: Gesture::Erasing {
                    radius,
                    cursor: world,
                },
            });
            log::debug!("Erasing with radius {}", radius);
            let outcome = match self.erase_at(world, radius) {
                Some(id) => GestureOutcome::Erased(id),
                None => GestureOutcome::Started(GestureMode::Erasing),
            };
            self.frame.invalidate(false, true);
            return outcome;
        }

        let point = InkPoint::new(
            world.x,
            world.y,
            InkPoint::normalize_pressure(input.pressure),
            input.timestamp_ms,
        );
        self.active = Some(ActivePointer {
            pointer_id: input.pointer_id,
            gesture: Gesture::Drawing {
                points: vec![point],
                last: world,
            },
        });
        self.frame.invalidate(false, true);
        GestureOutcome::Started(GestureMode::Drawing)
    }

    fn begin_select(&mut self, input: &PointerInput, world: Point, attempt_id: AttemptId) -> GestureOutcome {
        log::debug!("Selected attempt {}", attempt_id);
        self.store
            .borrow_mut()
            .set_selected_attempt_id(Some(attempt_id.clone()));

        let gesture = if self.config.touch_environment {
            Gesture::Holding {
                attempt_id,
                start: world,
                deadline_ms: input.timestamp_ms + self.config.hold_delay_ms,
            }
        } else {
            Gesture::Dragging {
                attempt_id,
                last: world,
                total: Vec2::ZERO,
            }
        };
        let mode = gesture.mode();
        self.active = Some(ActivePointer {
            pointer_id: input.pointer_id,
            gesture,
        });
        GestureOutcome::Started(mode)
    }

    /// One eraser pass: remove the most recent stroke of the active attempt
    /// that has a sample within the eraser radius of `world`.
    fn erase_at(&mut self, world: Point, radius: f64) -> Option<StrokeId> {
        let radius = radius.max(self.config.eraser_hit_floor_world);
        let r2 = radius * radius;
        let size_factor = self.config.eraser_bbox_size_factor;

        let hit: Stroke = {
            let store = self.store.borrow();
            let attempt_id = store.active_attempt_id()?;
            store
                .strokes()
                .iter()
                .rev()
                .filter(|s| s.belongs_to(attempt_id))
                .find(|s| {
                    s.bbox
                        .expand(radius + s.base_size * size_factor)
                        .contains(world.x, world.y)
                        && s.points
                            .iter()
                            .any(|p| squared_distance(p.x, p.y, world.x, world.y) <= r2)
                })?
                .clone()
        };

        log::debug!("Eraser hit stroke {}", hit.id);
        let id = hit.id.clone();
        self.store
            .borrow_mut()
            .exec(Command::Delete(vec![hit.clone()]));
        self.outbox.push(PersistOp::Delete(vec![hit]));
        Some(id)
    }

    fn commit_stroke(&mut self, points: Vec<InkPoint>) -> GestureOutcome {
        let stroke = {
            let store = self.store.borrow();
            let (Some(context), Some(attempt_id)) = (store.context(), store.active_attempt_id()) else {
                return GestureOutcome::Discarded;
            };
            if points.len() < 2 {
                return GestureOutcome::Discarded;
            }
            let now = store.now_ms();
            let bbox = BoundingBox::from_points(&points);
            Stroke {
                id: StrokeId::generate(),
                session_id: context.session_id.clone(),
                document_id: context.document_id.clone(),
                attempt_id: attempt_id.clone(),
                created_at: now,
                updated_at: now,
                tool: store.brush().tool().unwrap_or(InkTool::Pencil),
                color: store.color().to_string(),
                opacity: store.opacity(),
                base_size: store.base_size(),
                points,
                bbox,
            }
        };

        let id = stroke.id.clone();
        log::debug!("Committing stroke {} with {} points", id, stroke.points.len());
        self.store.borrow_mut().exec(Command::Add(stroke.clone()));
        self.outbox.push(PersistOp::Save(stroke));
        GestureOutcome::Committed(id)
    }

    /// Attempt whose card contains `world`, newest card first.
    fn hit_other_attempt(&self, world: Point) -> Option<AttemptId> {
        self.other_attempt_cards()
            .into_iter()
            .rev()
            .find(|card| card.bbox.contains(world.x, world.y))
            .map(|card| card.attempt_id)
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        let Some(id) = self.subscription.take() else {
            return;
        };
        match self.store.try_borrow_mut() {
            Ok(mut store) => {
                store.unsubscribe(id);
            }
            Err(_) => log::warn!("Store busy while dropping overlay; subscription leaked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::paint::{PaintOp, PaintRecorder};
    use crate::storage::MemoryAttemptDirectory;
    use crate::store::{InkContext, InkStore};
    use crate::stroke::Brush;
    use crate::stroke::test_support::stroke;

    struct Harness {
        overlay: Overlay,
        store: SharedStore,
        frames: Rc<Cell<usize>>,
    }

    fn harness(config: InkConfig) -> Harness {
        let clock = Rc::new(ManualClock::new(1_000));
        let store = InkStore::with_clock(clock).shared();
        store
            .borrow_mut()
            .set_context(Some(InkContext::new("session", "document")));
        let mut overlay = Overlay::new(store.clone(), config);
        overlay.set_active_attempt(Some(AttemptId::from("active")));
        let frames = Rc::new(Cell::new(0));
        let counter = frames.clone();
        overlay.set_frame_requester(Rc::new(move || counter.set(counter.get() + 1)));
        Harness {
            overlay,
            store,
            frames,
        }
    }

    fn pen(x: f64, y: f64, t: i64) -> PointerInput {
        PointerInput::new(1, PointerKind::Pen, Point::new(x, y), t)
    }

    fn mouse(x: f64, y: f64, t: i64) -> PointerInput {
        PointerInput::new(2, PointerKind::Mouse, Point::new(x, y), t)
    }

    fn touch(x: f64, y: f64, t: i64) -> PointerInput {
        PointerInput::new(3, PointerKind::Touch, Point::new(x, y), t)
    }

    #[test]
    fn test_pen_draw_commits_stroke() {
        let mut h = harness(InkConfig::default());
        assert_eq!(
            h.overlay.pointer_down(&pen(10.0, 10.0, 0)),
            GestureOutcome::Started(GestureMode::Drawing)
        );
        for (i, x) in [14.0, 18.0, 22.0, 26.0].iter().enumerate() {
            assert_eq!(
                h.overlay.pointer_move(&pen(*x, 12.0, 16 * (i as i64 + 1))),
                GestureOutcome::Updated
            );
        }
        let outcome = h.overlay.pointer_up(&pen(26.0, 12.0, 80));
        let GestureOutcome::Committed(id) = outcome else {
            panic!("expected commit, got {:?}", outcome);
        };

        let store = h.store.borrow();
        assert_eq!(store.strokes().len(), 1);
        let s = &store.strokes()[0];
        assert_eq!(s.id, id);
        assert_eq!(s.points.len(), 5);
        assert_eq!(s.bbox, BoundingBox::new(10.0, 10.0, 26.0, 12.0));
        assert_eq!(s.attempt_id, AttemptId::from("active"));
        assert_eq!(s.tool, InkTool::Pencil);
        assert_eq!(s.points[0].pressure, 0.5);
        assert_eq!(store.undo_len(), 1);
        assert_eq!(h.overlay.outbox().pending(), vec![PersistOp::Save(s.clone())]);
        assert_eq!(h.overlay.mode(), GestureMode::Idle);
    }

    #[test]
    fn test_tap_is_discarded() {
        let mut h = harness(InkConfig::default());
        h.overlay.pointer_down(&pen(10.0, 10.0, 0));
        assert_eq!(h.overlay.pointer_move(&pen(10.2, 10.1, 8)), GestureOutcome::Skipped);
        assert_eq!(h.overlay.pointer_up(&pen(10.2, 10.1, 16)), GestureOutcome::Discarded);
        assert!(h.store.borrow().strokes().is_empty());
        assert!(!h.store.borrow().can_undo());
        assert!(h.overlay.outbox().is_empty());
    }

    #[test]
    fn test_sampling_gate_scales_with_zoom() {
        let mut h = harness(InkConfig::default());
        // At 4x zoom the 0.6 px gate is 0.15 world units.
        h.overlay.set_viewport(Viewport::new(Vec2::ZERO, 4.0));
        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        // 0.5 container px = 0.125 world: below the gate.
        assert_eq!(h.overlay.pointer_move(&pen(0.5, 0.0, 8)), GestureOutcome::Skipped);
        // 1.0 container px = 0.25 world: accepted.
        assert_eq!(h.overlay.pointer_move(&pen(1.0, 0.0, 16)), GestureOutcome::Updated);
        assert_eq!(h.overlay.draft_points().len(), 2);
        assert_eq!(h.overlay.draft_points()[1].x, 0.25);
    }

    #[test]
    fn test_pen_without_active_attempt_is_ignored() {
        let mut h = harness(InkConfig::default());
        h.overlay.set_active_attempt(None);
        assert_eq!(h.overlay.pointer_down(&pen(0.0, 0.0, 0)), GestureOutcome::Ignored);
        assert_eq!(h.overlay.mode(), GestureMode::Idle);
    }

    #[test]
    fn test_device_pressure_is_kept() {
        let mut h = harness(InkConfig::default());
        h.overlay.pointer_down(&pen(0.0, 0.0, 0).with_pressure(0.8));
        h.overlay.pointer_move(&pen(5.0, 0.0, 16).with_pressure(0.3));
        let pts = h.overlay.draft_points();
        assert_eq!(pts[0].pressure, 0.8);
        assert_eq!(pts[1].pressure, 0.3);
    }

    #[test]
    fn test_eraser_prefers_newest_and_removes_one() {
        let mut h = harness(InkConfig::default());
        let older = stroke("older", "active", 10, &[(0.0, 0.0), (10.0, 0.0)]);
        let newer = stroke("newer", "active", 20, &[(0.0, 1.0), (10.0, 1.0)]);
        h.store.borrow_mut().hydrate(vec![older.clone(), newer.clone()]);
        h.store.borrow_mut().set_brush(Brush::Eraser);

        assert_eq!(
            h.overlay.pointer_down(&pen(5.0, 0.5, 0)),
            GestureOutcome::Erased(StrokeId::from("newer"))
        );
        assert_eq!(h.store.borrow().strokes(), &[older.clone()]);
        assert_eq!(h.overlay.outbox().pending(), vec![PersistOp::Delete(vec![newer])]);

        // The next pass takes the remaining one.
        assert_eq!(
            h.overlay.pointer_move(&pen(5.5, 0.5, 16)),
            GestureOutcome::Erased(StrokeId::from("older"))
        );
        assert!(h.store.borrow().strokes().is_empty());
        assert_eq!(h.overlay.pointer_up(&pen(5.5, 0.5, 32)), GestureOutcome::Ended);
        assert_eq!(h.store.borrow().undo_len(), 2);
    }

    #[test]
    fn test_eraser_only_touches_active_attempt() {
        let mut h = harness(InkConfig::default());
        let other = stroke("other", "past", 10, &[(0.0, 0.0), (10.0, 0.0)]);
        h.store.borrow_mut().hydrate(vec![other.clone()]);
        h.store.borrow_mut().set_brush(Brush::Eraser);

        assert_eq!(
            h.overlay.pointer_down(&pen(5.0, 0.0, 0)),
            GestureOutcome::Started(GestureMode::Erasing)
        );
        assert_eq!(h.overlay.pointer_move(&pen(2.0, 0.0, 16)), GestureOutcome::Updated);
        assert_eq!(h.store.borrow().strokes(), &[other]);
        assert!(h.overlay.outbox().is_empty());
    }

    #[test]
    fn test_eraser_needs_a_nearby_sample() {
        let mut h = harness(InkConfig::default());
        // Long straight segment: the midpoint is inside the box but far from any sample.
        let s = stroke("s", "active", 10, &[(0.0, 0.0), (200.0, 0.0)]);
        h.store.borrow_mut().hydrate(vec![s]);
        h.store.borrow_mut().set_brush(Brush::Eraser);
        assert_eq!(
            h.overlay.pointer_down(&pen(100.0, 0.0, 0)),
            GestureOutcome::Started(GestureMode::Erasing)
        );
        assert_eq!(h.store.borrow().strokes().len(), 1);
    }

    #[test]
    fn test_mouse_drag_moves_other_attempt() {
        let mut h = harness(InkConfig::default());
        let past = stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)]);
        h.store.borrow_mut().hydrate(vec![past]);

        assert_eq!(
            h.overlay.pointer_down(&mouse(110.0, 105.0, 0)),
            GestureOutcome::Started(GestureMode::Dragging)
        );
        assert_eq!(
            h.store.borrow().selected_attempt_id(),
            Some(&AttemptId::from("past"))
        );
        h.overlay.pointer_move(&mouse(115.0, 105.0, 16));
        h.overlay.pointer_move(&mouse(120.0, 110.0, 32));
        assert_eq!(
            h.store.borrow().strokes()[0].bbox,
            BoundingBox::new(110.0, 105.0, 130.0, 115.0)
        );
        // Intermediate frames are not undoable on their own.
        assert!(!h.store.borrow().can_undo());

        assert_eq!(
            h.overlay.pointer_up(&mouse(120.0, 110.0, 48)),
            GestureOutcome::Translated {
                attempt_id: AttemptId::from("past"),
                dx: 10.0,
                dy: 5.0,
            }
        );
        assert_eq!(h.store.borrow().undo_len(), 1);
        assert_eq!(
            h.overlay.outbox().pending(),
            vec![PersistOp::TranslateAttempt {
                attempt_id: AttemptId::from("past"),
                dx: 10.0,
                dy: 5.0,
            }]
        );

        h.overlay.undo();
        assert_eq!(
            h.store.borrow().strokes()[0].bbox,
            BoundingBox::new(100.0, 100.0, 120.0, 110.0)
        );
        assert_eq!(h.overlay.outbox().len(), 2);
    }

    #[test]
    fn test_drag_without_movement_leaves_no_history() {
        let mut h = harness(InkConfig::default());
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        h.overlay.pointer_down(&mouse(110.0, 105.0, 0));
        assert_eq!(h.overlay.pointer_move(&mouse(110.0, 105.0, 16)), GestureOutcome::Skipped);
        assert_eq!(h.overlay.pointer_up(&mouse(110.0, 105.0, 32)), GestureOutcome::Ended);
        assert!(!h.store.borrow().can_undo());
        assert!(h.overlay.outbox().is_empty());
        // The tap still selected the attempt.
        assert_eq!(
            h.store.borrow().selected_attempt_id(),
            Some(&AttemptId::from("past"))
        );
    }

    #[test]
    fn test_mouse_off_cards_draws() {
        let mut h = harness(InkConfig::default());
        assert_eq!(
            h.overlay.pointer_down(&mouse(0.0, 0.0, 0)),
            GestureOutcome::Started(GestureMode::Drawing)
        );
    }

    #[test]
    fn test_touch_only_selects() {
        let mut h = harness(InkConfig::default());
        assert_eq!(h.overlay.pointer_down(&touch(0.0, 0.0, 0)), GestureOutcome::Ignored);
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        // Inside the padded card but outside the strokes' own box.
        assert_eq!(
            h.overlay.pointer_down(&touch(90.0, 95.0, 0)),
            GestureOutcome::Started(GestureMode::Dragging)
        );
    }

    #[test]
    fn test_active_attempt_has_no_card() {
        let mut h = harness(InkConfig::default());
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("mine", "active", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        assert_eq!(h.overlay.pointer_down(&touch(110.0, 105.0, 0)), GestureOutcome::Ignored);
    }

    #[test]
    fn test_touch_hold_then_drag() {
        let config = InkConfig {
            touch_environment: true,
            ..InkConfig::default()
        };
        let mut h = harness(config);
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);

        assert_eq!(
            h.overlay.pointer_down(&touch(110.0, 105.0, 1_000)),
            GestureOutcome::Started(GestureMode::Holding)
        );
        // Small wobble does not cancel the hold.
        assert_eq!(h.overlay.pointer_move(&touch(112.0, 105.0, 1_100)), GestureOutcome::Skipped);
        assert!(!h.overlay.tick(1_279));
        assert_eq!(h.overlay.mode(), GestureMode::Holding);
        assert!(h.overlay.tick(1_280));
        assert_eq!(h.overlay.mode(), GestureMode::Dragging);

        h.overlay.pointer_move(&touch(130.0, 115.0, 1_400));
        let outcome = h.overlay.pointer_up(&touch(130.0, 115.0, 1_450));
        assert_eq!(
            outcome,
            GestureOutcome::Translated {
                attempt_id: AttemptId::from("past"),
                dx: 20.0,
                dy: 10.0,
            }
        );
    }

    #[test]
    fn test_move_fires_elapsed_hold() {
        let config = InkConfig {
            touch_environment: true,
            ..InkConfig::default()
        };
        let mut h = harness(config);
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        h.overlay.pointer_down(&touch(110.0, 105.0, 0));
        // The host never ticked; the move itself notices the deadline passed.
        assert_eq!(h.overlay.pointer_move(&touch(150.0, 105.0, 500)), GestureOutcome::Updated);
        assert_eq!(h.overlay.mode(), GestureMode::Dragging);
    }

    #[test]
    fn test_hold_cancelled_by_movement() {
        let config = InkConfig {
            touch_environment: true,
            ..InkConfig::default()
        };
        let mut h = harness(config);
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        h.overlay.pointer_down(&touch(110.0, 105.0, 0));
        assert_eq!(
            h.overlay.pointer_move(&touch(120.0, 105.0, 100)),
            GestureOutcome::HoldCancelled
        );
        assert_eq!(h.overlay.mode(), GestureMode::Idle);
        assert!(!h.overlay.tick(1_000));
        assert_eq!(h.overlay.pointer_up(&touch(120.0, 105.0, 200)), GestureOutcome::Ignored);
        assert_eq!(
            h.store.borrow().strokes()[0].bbox,
            BoundingBox::new(100.0, 100.0, 120.0, 110.0)
        );
        assert_eq!(
            h.store.borrow().selected_attempt_id(),
            Some(&AttemptId::from("past"))
        );
    }

    #[test]
    fn test_second_pointer_is_ignored() {
        let mut h = harness(InkConfig::default());
        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        let other = PointerInput::new(9, PointerKind::Pen, Point::new(50.0, 50.0), 5);
        assert_eq!(h.overlay.pointer_down(&other), GestureOutcome::Ignored);
        assert_eq!(h.overlay.pointer_move(&other.moved_to(Point::new(60.0, 60.0), 10)), GestureOutcome::Ignored);
        assert_eq!(h.overlay.pointer_up(&other), GestureOutcome::Ignored);
        h.overlay.pointer_move(&pen(5.0, 0.0, 16));
        assert!(matches!(h.overlay.pointer_up(&pen(5.0, 0.0, 32)), GestureOutcome::Committed(_)));
    }

    #[test]
    fn test_cancel_drops_draft_and_keeps_drag() {
        let mut h = harness(InkConfig::default());
        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        h.overlay.pointer_move(&pen(5.0, 0.0, 16));
        assert_eq!(h.overlay.pointer_cancel(&pen(5.0, 0.0, 20)), GestureOutcome::Cancelled);
        assert!(h.store.borrow().strokes().is_empty());
        assert_eq!(h.overlay.mode(), GestureMode::Idle);

        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        h.overlay.pointer_down(&mouse(110.0, 105.0, 100));
        h.overlay.pointer_move(&mouse(115.0, 105.0, 116));
        h.overlay.pointer_cancel(&mouse(115.0, 105.0, 120));
        // The partial move stays; nothing is recorded or persisted.
        assert_eq!(
            h.store.borrow().strokes()[0].bbox,
            BoundingBox::new(105.0, 100.0, 125.0, 110.0)
        );
        assert!(!h.store.borrow().can_undo());
        assert!(h.overlay.outbox().is_empty());
    }

    #[test]
    fn test_context_switch_abandons_gesture() {
        let mut h = harness(InkConfig::default());
        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        h.store
            .borrow_mut()
            .set_context(Some(InkContext::new("session", "other")));
        assert_eq!(h.overlay.pointer_move(&pen(5.0, 0.0, 16)), GestureOutcome::Ignored);
        assert_eq!(h.overlay.mode(), GestureMode::Idle);
    }

    #[test]
    fn test_repaints_are_coalesced() {
        let mut h = harness(InkConfig::default());
        let mut persisted = PaintRecorder::new();
        let mut live = PaintRecorder::new();
        h.overlay.render_frame(&mut persisted, &mut live);
        h.frames.set(0);

        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        h.overlay.pointer_move(&pen(5.0, 0.0, 16));
        h.overlay.pointer_move(&pen(10.0, 0.0, 32));
        assert_eq!(h.frames.get(), 1);

        let painted = h.overlay.render_frame(&mut persisted, &mut live);
        assert_eq!(painted, FramePainted { persisted: false, live: true });
        assert_eq!(live.fill_path_count(), 1);

        // Nothing dirty: a second frame paints nothing.
        assert_eq!(h.overlay.render_frame(&mut persisted, &mut live), FramePainted::default());

        h.overlay.pointer_up(&pen(10.0, 0.0, 48));
        assert_eq!(h.frames.get(), 2);
        let painted = h.overlay.render_frame(&mut persisted, &mut live);
        assert!(painted.persisted && painted.live);
    }

    #[test]
    fn test_viewport_uses_configured_clamp() {
        let config = InkConfig {
            min_ratio: 0.5,
            ..InkConfig::default()
        };
        let mut h = harness(config);
        h.overlay.set_viewport(Viewport::new(Vec2::ZERO, 0.01));
        assert_eq!(h.overlay.viewport().ratio(), 0.5);
        h.overlay.pointer_down(&pen(10.0, 10.0, 0));
        assert_eq!(h.overlay.draft_points()[0].x, 20.0);
    }

    #[test]
    fn test_frames_requested_without_manual_render() {
        let mut h = harness(InkConfig::default());
        // Layers dirtied before the requester was attached still get a frame.
        assert_eq!(h.frames.get(), 1);

        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        h.overlay.pointer_move(&pen(5.0, 0.0, 16));
        h.overlay.pointer_up(&pen(5.0, 0.0, 32));
        // Still one outstanding request until the host renders.
        assert_eq!(h.frames.get(), 1);

        let mut persisted = PaintRecorder::new();
        let mut live = PaintRecorder::new();
        let painted = h.overlay.render_frame(&mut persisted, &mut live);
        assert!(painted.persisted && painted.live);
        assert_eq!(persisted.fill_path_count(), 1);

        h.overlay.pointer_down(&pen(20.0, 0.0, 100));
        assert_eq!(h.frames.get(), 2);
    }

    #[test]
    fn test_requester_attached_later_gets_pending_frame() {
        let store = InkStore::new().shared();
        let mut overlay = Overlay::new(store, InkConfig::default());
        let frames = Rc::new(Cell::new(0));
        let counter = frames.clone();
        overlay.set_frame_requester(Rc::new(move || counter.set(counter.get() + 1)));
        assert_eq!(frames.get(), 1);

        let mut persisted = PaintRecorder::new();
        let mut live = PaintRecorder::new();
        overlay.render_frame(&mut persisted, &mut live);
        // Nothing dirty: re-attaching does not request.
        let counter = frames.clone();
        overlay.set_frame_requester(Rc::new(move || counter.set(counter.get() + 1)));
        assert_eq!(frames.get(), 1);
    }

    #[test]
    fn test_cancel_discards_pending_hold() {
        let config = InkConfig {
            touch_environment: true,
            ..InkConfig::default()
        };
        let mut h = harness(config);
        h.store
            .borrow_mut()
            .hydrate(vec![stroke("p", "past", 10, &[(100.0, 100.0), (120.0, 110.0)])]);
        assert_eq!(
            h.overlay.pointer_down(&touch(110.0, 105.0, 0)),
            GestureOutcome::Started(GestureMode::Holding)
        );
        assert_eq!(h.overlay.pointer_cancel(&touch(110.0, 105.0, 50)), GestureOutcome::Cancelled);

        assert!(!h.overlay.tick(280));
        assert_eq!(h.overlay.mode(), GestureMode::Idle);
        assert_eq!(h.overlay.pointer_move(&touch(150.0, 105.0, 400)), GestureOutcome::Ignored);
        assert_eq!(
            h.store.borrow().strokes()[0].bbox,
            BoundingBox::new(100.0, 100.0, 120.0, 110.0)
        );
        assert!(h.overlay.outbox().is_empty());
        assert!(!h.store.borrow().can_undo());
    }

    #[test]
    fn test_undo_redo_queue_persistence() {
        let mut h = harness(InkConfig::default());
        h.overlay.pointer_down(&pen(0.0, 0.0, 0));
        h.overlay.pointer_move(&pen(5.0, 0.0, 16));
        h.overlay.pointer_up(&pen(5.0, 0.0, 32));
        let s = h.store.borrow().strokes()[0].clone();
        h.overlay.outbox().clear();

        assert_eq!(h.overlay.undo(), Some(Command::Add(s.clone())));
        assert_eq!(h.overlay.redo(), Some(Command::Add(s.clone())));
        assert_eq!(
            h.overlay.outbox().pending(),
            vec![PersistOp::Delete(vec![s.clone()]), PersistOp::Save(s)]
        );
        assert_eq!(h.overlay.redo(), None);
    }

    #[test]
    fn test_labels_and_double_click() {
        let mut h = harness(InkConfig::default());
        let directory = MemoryAttemptDirectory::new();
        directory.insert("session", "document", "past", "Problem 3b");
        pollster::block_on(h.overlay.refresh_labels(&directory)).unwrap();
        assert_eq!(h.overlay.label_for(&AttemptId::from("past")), "Problem 3b");
        assert_eq!(h.overlay.label_for(&AttemptId::from("unknown")), FALLBACK_LABEL);

        h.store
            .borrow_mut()
            .set_selected_attempt_id(Some(AttemptId::from("past")));
        h.overlay.double_click();
        assert_eq!(h.store.borrow().selected_attempt_id(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let h = harness(InkConfig::default());
        let Harness { overlay, store, frames } = h;
        drop(overlay);
        frames.set(0);
        store.borrow_mut().set_brush(Brush::Pen);
        assert_eq!(frames.get(), 0);
    }

    #[test]
    fn test_live_layer_paints_eraser_ring() {
        let mut h = harness(InkConfig::default());
        h.store.borrow_mut().set_brush(Brush::Eraser);
        h.overlay.pointer_down(&pen(5.0, 5.0, 0));
        let mut live = PaintRecorder::new();
        h.overlay.paint_live(&mut live);
        let ring = live.ops.iter().find_map(|op| match op {
            PaintOp::StrokeCircle { center, radius, width, .. } => Some((*center, *radius, *width)),
            _ => None,
        });
        assert_eq!(ring, Some((Point::new(5.0, 5.0), 12.0, 1.5)));
    }
}
