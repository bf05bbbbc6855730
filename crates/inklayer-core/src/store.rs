//! The ink state store: strokes of the current context, brush settings,
//! selection and the command-based undo/redo history.
//!
//! Every mutation goes through a method on [`InkStore`]; observers learn about
//! changes through [`InkStore::subscribe`].

use crate::clock::{Clock, SystemClock};
use crate::geometry::BoundingBox;
use crate::stroke::{AttemptId, Brush, DocumentId, SessionId, Stroke, StrokeId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Default brush color.
pub const DEFAULT_COLOR: &str = "#111827";
/// Default stroke base size.
pub const DEFAULT_BASE_SIZE: f64 = 2.2;

/// The (session, document) pair whose ink is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InkContext {
    pub session_id: SessionId,
    pub document_id: DocumentId,
}

impl InkContext {
    pub fn new(session_id: impl Into<SessionId>, document_id: impl Into<DocumentId>) -> Self {
        Self {
            session_id: session_id.into(),
            document_id: document_id.into(),
        }
    }
}

/// An undoable unit of store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(Stroke),
    /// Never empty when executed.
    Delete(Vec<Stroke>),
    TranslateAttempt {
        attempt_id: AttemptId,
        dx: f64,
        dy: f64,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add(_) => "add",
            Command::Delete(_) => "delete",
            Command::TranslateAttempt { .. } => "translateAttempt",
        }
    }
}

/// What changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ContextChanged,
    Hydrated,
    StrokesChanged,
    SelectionChanged,
    SettingsChanged,
    HistoryChanged,
}

/// Handle returned by [`InkStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(StoreEvent)>;

/// Store shared between the host UI and the overlay on one thread.
pub type SharedStore = Rc<RefCell<InkStore>>;

/// Authoritative in-memory ink state for one context.
pub struct InkStore {
    context: Option<InkContext>,
    /// Sorted by `created_at`, stable for equal timestamps.
    strokes: Vec<Stroke>,

    active_attempt_id: Option<AttemptId>,
    brush: Brush,
    color: String,
    opacity: f64,
    base_size: f64,

    selected_attempt_id: Option<AttemptId>,

    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,

    clock: Rc<dyn Clock>,
    revision: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl Default for InkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InkStore")
            .field("context", &self.context)
            .field("strokes", &self.strokes.len())
            .field("active_attempt_id", &self.active_attempt_id)
            .field("brush", &self.brush)
            .field("selected_attempt_id", &self.selected_attempt_id)
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl InkStore {
    pub fn new() -> Self {
        Self::with_clock(Rc::new(SystemClock))
    }

    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            context: None,
            strokes: Vec::new(),
            active_attempt_id: None,
            brush: Brush::Pencil,
            color: DEFAULT_COLOR.to_string(),
            opacity: 1.0,
            base_size: DEFAULT_BASE_SIZE,
            selected_attempt_id: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            clock,
            revision: 0,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Wrap into a [`SharedStore`].
    pub fn shared(self) -> SharedStore {
        Rc::new(RefCell::new(self))
    }

    // --- observers ---

    pub fn subscribe(&mut self, listener: impl FnMut(StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn notify(&mut self, event: StoreEvent) {
        self.revision += 1;
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    // --- context ---

    /// Switch context. Clears strokes, selection and both history stacks.
    pub fn set_context(&mut self, context: Option<InkContext>) {
        log::info!("Ink context -> {:?}", context);
        self.context = context;
        self.strokes.clear();
        self.selected_attempt_id = None;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.notify(StoreEvent::ContextChanged);
    }

    pub fn context(&self) -> Option<&InkContext> {
        self.context.as_ref()
    }

    /// Replace the working set, sorted by creation time.
    pub fn hydrate(&mut self, mut strokes: Vec<Stroke>) {
        strokes.sort_by_key(|s| s.created_at);
        log::info!("Hydrated {} strokes", strokes.len());
        self.strokes = strokes;
        self.notify(StoreEvent::Hydrated);
    }

    // --- reads ---

    /// All strokes, oldest first.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn stroke(&self, id: &StrokeId) -> Option<&Stroke> {
        self.strokes.iter().find(|s| &s.id == id)
    }

    pub fn strokes_for_attempt<'a>(&'a self, attempt_id: &'a AttemptId) -> impl Iterator<Item = &'a Stroke> + 'a {
        self.strokes.iter().filter(move |s| s.belongs_to(attempt_id))
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // --- settings ---

    pub fn active_attempt_id(&self) -> Option<&AttemptId> {
        self.active_attempt_id.as_ref()
    }

    pub fn set_active_attempt_id(&mut self, attempt_id: Option<AttemptId>) {
        if self.active_attempt_id != attempt_id {
            self.active_attempt_id = attempt_id;
            self.notify(StoreEvent::SettingsChanged);
        }
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
        self.notify(StoreEvent::SettingsChanged);
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
        self.notify(StoreEvent::SettingsChanged);
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Clamped to `[0, 1]`; NaN is ignored.
    pub fn set_opacity(&mut self, opacity: f64) {
        if opacity.is_nan() {
            return;
        }
        self.opacity = opacity.clamp(0.0, 1.0);
        self.notify(StoreEvent::SettingsChanged);
    }

    pub fn base_size(&self) -> f64 {
        self.base_size
    }

    /// Returns `false` and keeps the old size unless `size` is finite and positive.
    pub fn set_base_size(&mut self, size: f64) -> bool {
        if !(size.is_finite() && size > 0.0) {
            log::warn!("Rejected base size {}", size);
            return false;
        }
        self.base_size = size;
        self.notify(StoreEvent::SettingsChanged);
        true
    }

    // --- commands ---

    /// Apply `command`, record it for undo and clear the redo stack.
    ///
    /// Returns `false` for an empty delete, which is not recorded.
    pub fn exec(&mut self, command: Command) -> bool {
        if matches!(&command, Command::Delete(list) if list.is_empty()) {
            log::warn!("Ignoring empty delete command");
            return false;
        }
        log::debug!("exec {}", command.name());
        self.apply_forward(&command);
        self.undo_stack.push(command);
        self.redo_stack.clear();
        self.notify(StoreEvent::StrokesChanged);
        true
    }

    /// Translate an attempt's strokes without touching history. The caller
    /// records the net move with [`InkStore::push_command`] when done.
    pub fn apply_translation(&mut self, attempt_id: &AttemptId, dx: f64, dy: f64) {
        self.translate(attempt_id, dx, dy);
        self.notify(StoreEvent::StrokesChanged);
    }

    /// Record an already-applied command and clear the redo stack.
    pub fn push_command(&mut self, command: Command) {
        log::debug!("push {}", command.name());
        self.undo_stack.push(command);
        self.redo_stack.clear();
        self.notify(StoreEvent::HistoryChanged);
    }

    /// Revert the most recent command. Returns it, or `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Command> {
        let command = self.undo_stack.pop()?;
        log::debug!("undo {}", command.name());
        match &command {
            Command::Add(stroke) => self.remove_ids(&[stroke.id.clone()]),
            Command::Delete(strokes) => self.insert_all(strokes.iter().cloned()),
            Command::TranslateAttempt { attempt_id, dx, dy } => self.translate(attempt_id, -dx, -dy),
        }
        self.redo_stack.push(command.clone());
        self.notify(StoreEvent::StrokesChanged);
        Some(command)
    }

    /// Re-apply the most recently undone command.
    pub fn redo(&mut self) -> Option<Command> {
        let command = self.redo_stack.pop()?;
        log::debug!("redo {}", command.name());
        self.apply_forward(&command);
        self.undo_stack.push(command.clone());
        self.notify(StoreEvent::StrokesChanged);
        Some(command)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_stack(&self) -> &[Command] {
        &self.undo_stack
    }

    pub fn redo_stack(&self) -> &[Command] {
        &self.redo_stack
    }

    fn apply_forward(&mut self, command: &Command) {
        match command {
            Command::Add(stroke) => self.insert_all(std::iter::once(stroke.clone())),
            Command::Delete(strokes) => {
                let ids: Vec<StrokeId> = strokes.iter().map(|s| s.id.clone()).collect();
                self.remove_ids(&ids);
            }
            Command::TranslateAttempt { attempt_id, dx, dy } => self.translate(attempt_id, *dx, *dy),
        }
    }

    fn insert_all(&mut self, strokes: impl IntoIterator<Item = Stroke>) {
        self.strokes.extend(strokes);
        self.strokes.sort_by_key(|s| s.created_at);
    }

    fn remove_ids(&mut self, ids: &[StrokeId]) {
        let ids: HashSet<&StrokeId> = ids.iter().collect();
        self.strokes.retain(|s| !ids.contains(&s.id));
    }

    fn translate(&mut self, attempt_id: &AttemptId, dx: f64, dy: f64) {
        let now = self.clock.now_ms();
        for stroke in self.strokes.iter_mut().filter(|s| s.belongs_to(attempt_id)) {
            stroke.translate(dx, dy, now);
        }
    }

    // --- selection ---

    pub fn selected_attempt_id(&self) -> Option<&AttemptId> {
        self.selected_attempt_id.as_ref()
    }

    pub fn set_selected_attempt_id(&mut self, attempt_id: Option<AttemptId>) {
        self.selected_attempt_id = attempt_id;
        self.notify(StoreEvent::SelectionChanged);
    }

    pub fn clear_selection(&mut self) {
        self.set_selected_attempt_id(None);
    }

    /// Union of the selected attempt's stroke boxes, or `None` when nothing is
    /// selected or the attempt has no strokes.
    pub fn selection_bbox(&self) -> Option<(AttemptId, BoundingBox)> {
        let attempt_id = self.selected_attempt_id.as_ref()?;
        let bbox = BoundingBox::union_all(self.strokes_for_attempt(attempt_id).map(|s| &s.bbox))?;
        Some((attempt_id.clone(), bbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stroke::test_support::stroke;
    use std::cell::Cell;

    fn store() -> (InkStore, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(1_000));
        (InkStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_defaults() {
        let (store, _) = store();
        assert_eq!(store.brush(), Brush::Pencil);
        assert_eq!(store.color(), "#111827");
        assert_eq!(store.opacity(), 1.0);
        assert_eq!(store.base_size(), 2.2);
        assert!(store.context().is_none());
    }

    #[test]
    fn test_add_undo_redo_scenario() {
        let (mut store, _) = store();
        let coords = [(0.0, 0.0), (4.0, 1.0), (9.0, -3.0), (2.0, 7.0), (5.0, 5.0)];
        let mut s = stroke("s1", "a1", 10, &coords);
        s.base_size = 2.0;
        assert_eq!(s.bbox, BoundingBox::new(0.0, -3.0, 9.0, 7.0));

        assert!(store.exec(Command::Add(s.clone())));
        assert_eq!(store.strokes(), &[s.clone()]);

        assert_eq!(store.undo(), Some(Command::Add(s.clone())));
        assert!(store.strokes().is_empty());

        assert_eq!(store.redo(), Some(Command::Add(s.clone())));
        assert_eq!(store.strokes(), &[s]);
    }

    #[test]
    fn test_undo_add_leaves_others_untouched() {
        let (mut store, _) = store();
        let a = stroke("a", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)]);
        let b = stroke("b", "a2", 20, &[(5.0, 5.0), (6.0, 6.0)]);
        store.hydrate(vec![a.clone()]);
        store.exec(Command::Add(b));
        store.undo();
        assert_eq!(store.strokes(), &[a]);
    }

    #[test]
    fn test_multi_delete_undo_restores_all() {
        let (mut store, _) = store();
        let s1 = stroke("s1", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)]);
        let s2 = stroke("s2", "a1", 20, &[(2.0, 2.0), (3.0, 3.0)]);
        let s3 = stroke("s3", "a1", 30, &[(4.0, 4.0), (5.0, 5.0)]);
        store.hydrate(vec![s3.clone(), s1.clone(), s2.clone()]);

        store.exec(Command::Delete(vec![s1.clone(), s2.clone()]));
        assert_eq!(store.strokes(), &[s3.clone()]);

        store.undo();
        assert_eq!(store.strokes(), &[s1, s2, s3]);
        assert_eq!(store.undo_len(), 0);
        assert_eq!(store.redo_len(), 1);
    }

    #[test]
    fn test_empty_delete_rejected() {
        let (mut store, _) = store();
        assert!(!store.exec(Command::Delete(Vec::new())));
        assert!(!store.can_undo());
    }

    #[test]
    fn test_translate_round_trip() {
        let (mut store, clock) = store();
        let s1 = stroke("s1", "a1", 10, &[(0.0, 0.0), (10.0, 10.0)]);
        let s2 = stroke("s2", "a1", 20, &[(20.0, 20.0), (30.0, 30.0)]);
        let other = stroke("o", "a2", 30, &[(1.0, 1.0), (2.0, 2.0)]);
        store.hydrate(vec![s1.clone(), s2.clone(), other.clone()]);

        clock.set(5_000);
        store.exec(Command::TranslateAttempt {
            attempt_id: AttemptId::from("a1"),
            dx: 2.5,
            dy: -4.25,
        });
        let moved = store.stroke(&StrokeId::from("s1")).unwrap();
        assert_eq!(moved.bbox, BoundingBox::new(2.5, -4.25, 12.5, 5.75));
        assert_eq!(moved.updated_at, 5_000);
        assert_eq!(store.stroke(&StrokeId::from("o")).unwrap(), &other);

        store.exec(Command::TranslateAttempt {
            attempt_id: AttemptId::from("a1"),
            dx: -2.5,
            dy: 4.25,
        });
        for original in [&s1, &s2] {
            let now = store.stroke(&original.id).unwrap();
            assert_eq!(now.bbox, original.bbox);
            for (a, b) in now.points.iter().zip(&original.points) {
                assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_apply_translation_has_no_history() {
        let (mut store, _) = store();
        store.hydrate(vec![stroke("s1", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)])]);
        let id = AttemptId::from("a1");
        store.apply_translation(&id, 1.0, 0.0);
        store.apply_translation(&id, 2.0, 0.0);
        assert!(!store.can_undo());

        store.push_command(Command::TranslateAttempt { attempt_id: id, dx: 3.0, dy: 0.0 });
        assert_eq!(store.undo_len(), 1);
        store.undo();
        assert_eq!(store.strokes()[0].bbox, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_new_command_clears_redo() {
        let (mut store, _) = store();
        store.exec(Command::Add(stroke("s1", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)])));
        store.undo();
        assert!(store.can_redo());
        store.exec(Command::Add(stroke("s2", "a1", 20, &[(0.0, 0.0), (1.0, 1.0)])));
        assert!(!store.can_redo());
    }

    #[test]
    fn test_undo_redo_empty_stacks() {
        let (mut store, _) = store();
        assert_eq!(store.undo(), None);
        assert_eq!(store.redo(), None);
    }

    #[test]
    fn test_strokes_sorted_by_creation() {
        let (mut store, _) = store();
        store.hydrate(vec![
            stroke("late", "a1", 30, &[(0.0, 0.0), (1.0, 1.0)]),
            stroke("early", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)]),
        ]);
        store.exec(Command::Add(stroke("mid", "a1", 20, &[(0.0, 0.0), (1.0, 1.0)])));
        let ids: Vec<&str> = store.strokes().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["early", "mid", "late"]);
    }

    #[test]
    fn test_selection_bbox_scenario() {
        let (mut store, _) = store();
        store.hydrate(vec![
            stroke("s1", "A1", 10, &[(0.0, 0.0), (10.0, 10.0)]),
            stroke("s2", "A1", 20, &[(20.0, 20.0), (30.0, 30.0)]),
            stroke("s3", "B1", 30, &[(100.0, 100.0), (110.0, 110.0)]),
        ]);
        assert_eq!(store.selection_bbox(), None);
        store.set_selected_attempt_id(Some(AttemptId::from("A1")));
        assert_eq!(
            store.selection_bbox(),
            Some((AttemptId::from("A1"), BoundingBox::new(0.0, 0.0, 30.0, 30.0)))
        );
        store.set_selected_attempt_id(Some(AttemptId::from("nobody")));
        assert_eq!(store.selection_bbox(), None);
        store.clear_selection();
        assert_eq!(store.selected_attempt_id(), None);
    }

    #[test]
    fn test_set_context_clears_everything() {
        let (mut store, _) = store();
        store.set_context(Some(InkContext::new("s", "d1")));
        store.hydrate(vec![stroke("s1", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)])]);
        store.exec(Command::Add(stroke("s2", "a1", 20, &[(0.0, 0.0), (1.0, 1.0)])));
        store.exec(Command::Add(stroke("s3", "a1", 30, &[(0.0, 0.0), (1.0, 1.0)])));
        store.undo();
        store.set_selected_attempt_id(Some(AttemptId::from("a1")));
        assert!(store.can_undo() && store.can_redo());

        store.set_context(Some(InkContext::new("s", "d2")));
        assert!(store.strokes().is_empty());
        assert!(!store.can_undo() && !store.can_redo());
        assert_eq!(store.selected_attempt_id(), None);
        assert_eq!(store.context(), Some(&InkContext::new("s", "d2")));
    }

    #[test]
    fn test_settings_validation() {
        let (mut store, _) = store();
        store.set_opacity(3.0);
        assert_eq!(store.opacity(), 1.0);
        store.set_opacity(-1.0);
        assert_eq!(store.opacity(), 0.0);
        store.set_opacity(f64::NAN);
        assert_eq!(store.opacity(), 0.0);
        assert!(!store.set_base_size(0.0));
        assert!(!store.set_base_size(f64::INFINITY));
        assert_eq!(store.base_size(), 2.2);
        assert!(store.set_base_size(4.0));
        assert_eq!(store.base_size(), 4.0);
    }

    #[test]
    fn test_subscribers_and_revision() {
        let (mut store, _) = store();
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let id = store.subscribe(move |_| seen.set(seen.get() + 1));

        let r0 = store.revision();
        store.set_brush(Brush::Marker);
        store.exec(Command::Add(stroke("s1", "a1", 10, &[(0.0, 0.0), (1.0, 1.0)])));
        assert_eq!(count.get(), 2);
        assert_eq!(store.revision(), r0 + 2);

        assert!(store.unsubscribe(id));
        store.set_brush(Brush::Pen);
        assert_eq!(count.get(), 2);
        assert!(!store.unsubscribe(id));
    }
}
