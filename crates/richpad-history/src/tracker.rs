/// Per-field edit session tracking.
///
/// Turns the raw notification stream of each attached field into
/// [`EditState`]s pushed onto an [`UndoRedoManager`]. A session opens on
/// the first before-change after the previous commit and is committed on
/// the next delayed-change, so a burst of edits becomes one undo step.
///
/// Undoing or redoing an `EditState` calls back into the tracker to
/// restore the field. The restore re-arms a delayed-change on the field;
/// that notification is recognized as the tail of the restore (not a user
/// edit) and completes the asynchronous action.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::edit_state::{EditState, RestoreCallback};
use crate::manager::{ActionCompletion, UndoRedoManager};
use crate::observer::{DocumentObserver, Notification};
use crate::snapshot::{CursorSnapshot, FieldId, Snapshot};

/// Editor commands the tracker answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Undo,
    Redo,
}

/// Tracks edit sessions for every field attached with [`enable`].
///
/// [`enable`]: EditSessionTracker::enable
#[derive(Clone)]
pub struct EditSessionTracker {
    core: Rc<TrackerCore>,
}

struct TrackerCore {
    observer: Rc<dyn DocumentObserver>,
    manager: RefCell<UndoRedoManager>,
    sessions: RefCell<Sessions>,
    /// Restore awaiting its trailing delayed-change.
    in_progress_undo: RefCell<Option<InProgressRestore>>,
    restore_callback: RestoreCallback,
}

#[derive(Default)]
struct Sessions {
    attached: HashSet<FieldId>,
    /// Uncommitted state per field; its undo side is the session baseline.
    current: HashMap<FieldId, EditState>,
    /// Fields whose session has seen a before-change since the last commit.
    open: HashSet<FieldId>,
}

struct InProgressRestore {
    field: FieldId,
    completion: ActionCompletion,
}

impl fmt::Debug for EditSessionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions = self.core.sessions.borrow();
        f.debug_struct("EditSessionTracker")
            .field("attached", &sessions.attached)
            .field("open", &sessions.open)
            .field(
                "restoring",
                &self
                    .core
                    .in_progress_undo
                    .borrow()
                    .as_ref()
                    .map(|r| r.field.clone()),
            )
            .finish()
    }
}

impl EditSessionTracker {
    pub fn new(manager: UndoRedoManager, observer: Rc<dyn DocumentObserver>) -> Self {
        let core = Rc::new_cyclic(|weak: &Weak<TrackerCore>| {
            let weak = weak.clone();
            let restore_callback: RestoreCallback = Rc::new(
                move |state: &EditState,
                      snapshot: &Snapshot,
                      cursor: Option<&CursorSnapshot>,
                      completion: ActionCompletion| match weak.upgrade() {
                    Some(core) => core.restore(state, snapshot, cursor, completion),
                    None => {
                        tracing::debug!("Tracker dropped; completing restore without effect");
                        completion.complete();
                    }
                },
            );
            TrackerCore {
                observer,
                manager: RefCell::new(manager),
                sessions: RefCell::new(Sessions::default()),
                in_progress_undo: RefCell::new(None),
                restore_callback,
            }
        });
        Self { core }
    }

    /// Starts tracking `field` from a fresh baseline.
    ///
    /// Pending changes from before tracking started are flushed without
    /// being recorded.
    pub fn enable(&self, field: &FieldId) {
        if self.is_enabled(field) {
            return;
        }
        let observer = &self.core.observer;
        observer.flush_pending_change(field);
        observer.subscribe(
            field,
            NotificationSink {
                field: field.clone(),
                tracker: Rc::downgrade(&self.core),
            },
        );

        {
            let mut sessions = self.core.sessions.borrow_mut();
            sessions.attached.insert(field.clone());
            sessions.current.remove(field);
            sessions.open.remove(field);
        }
        self.core.reset_baseline(field);
        tracing::debug!("Undo tracking enabled for field {field}");
    }

    /// Stops tracking `field`. A pending change is committed first.
    pub fn disable(&self, field: &FieldId) {
        if !self.is_enabled(field) {
            return;
        }
        let observer = &self.core.observer;
        observer.flush_pending_change(field);
        observer.unsubscribe(field);

        {
            let mut sessions = self.core.sessions.borrow_mut();
            sessions.attached.remove(field);
            sessions.current.remove(field);
            sessions.open.remove(field);
        }

        // The restore's trailing notification can no longer arrive.
        let orphaned = {
            let mut in_progress = self.core.in_progress_undo.borrow_mut();
            if in_progress.as_ref().is_some_and(|r| r.field == *field) {
                in_progress.take()
            } else {
                None
            }
        };
        if let Some(restore) = orphaned {
            tracing::debug!("Completing restore on disabled field {field}");
            restore.completion.complete();
        }
        tracing::debug!("Undo tracking disabled for field {field}");
    }

    pub fn is_enabled(&self, field: &FieldId) -> bool {
        self.core.sessions.borrow().attached.contains(field)
    }

    /// Recaptures the baseline of `field` without recording a state.
    pub fn refresh_current_state(&self, field: &FieldId) {
        if self.is_enabled(field) {
            self.core.sessions.borrow_mut().open.remove(field);
            self.core.reset_baseline(field);
        }
    }

    /// Clears the manager's history and re-baselines every attached field.
    pub fn clear_history(&self) {
        self.manager().clear_history();
        for field in &self.attached_fields() {
            self.refresh_current_state(field);
        }
    }

    /// Runs `command` against the manager.
    ///
    /// Uncommitted edits on attached fields are committed first, so an
    /// undo reverts them rather than the step before.
    pub fn exec_command(&self, command: Command) {
        for field in &self.attached_fields() {
            self.core.observer.flush_pending_change(field);
        }
        match command {
            Command::Undo => self.manager().undo(),
            Command::Redo => self.manager().redo(),
        }
    }

    fn attached_fields(&self) -> Vec<FieldId> {
        let mut fields: Vec<FieldId> = self
            .core
            .sessions
            .borrow()
            .attached
            .iter()
            .cloned()
            .collect();
        fields.sort();
        fields
    }

    /// Whether `command` currently has anything to act on.
    pub fn query_command_value(&self, command: Command) -> bool {
        let manager = self.manager();
        match command {
            Command::Undo => manager.has_undo_state(),
            Command::Redo => manager.has_redo_state(),
        }
    }

    /// The manager new states are pushed to.
    pub fn manager(&self) -> UndoRedoManager {
        self.core.manager.borrow().clone()
    }

    pub fn set_manager(&self, manager: UndoRedoManager) {
        *self.core.manager.borrow_mut() = manager;
    }

    /// The uncommitted state of `field`, if it is being tracked.
    pub fn current_state(&self, field: &FieldId) -> Option<EditState> {
        self.core.sessions.borrow().current.get(field).cloned()
    }

    /// Whether a restore is waiting for its trailing delayed-change.
    pub fn is_restoring(&self) -> bool {
        self.core.discard_abandoned_restore();
        self.core.in_progress_undo.borrow().is_some()
    }
}

impl TrackerCore {
    fn capture_state(&self, field: &FieldId) -> EditState {
        EditState::new(
            field.clone(),
            self.observer.capture_snapshot(field),
            self.observer.capture_cursor(field),
            Rc::clone(&self.restore_callback),
        )
    }

    fn reset_baseline(&self, field: &FieldId) {
        let state = self.capture_state(field);
        self.sessions
            .borrow_mut()
            .current
            .insert(field.clone(), state);
    }

    /// Equal content, or both blank per the observer.
    fn equivalent(&self, a: &Snapshot, b: &Snapshot) -> bool {
        a == b || (self.observer.is_canonically_empty(a) && self.observer.is_canonically_empty(b))
    }

    fn handle(&self, field: &FieldId, notification: Notification) {
        match notification {
            Notification::BeforeChange => self.handle_before_change(field),
            Notification::DelayedChange => self.handle_delayed_change(field),
            Notification::Blur => self.observer.flush_pending_change(field),
        }
    }

    /// Drops the in-progress restore once the manager stops waiting on it,
    /// e.g. after the action timeout abandoned it.
    fn discard_abandoned_restore(&self) {
        let abandoned = {
            let mut in_progress = self.in_progress_undo.borrow_mut();
            if in_progress.as_ref().is_some_and(|r| !r.completion.is_pending()) {
                in_progress.take()
            } else {
                None
            }
        };
        if let Some(restore) = abandoned {
            tracing::debug!("Restore on {} was abandoned by the manager", restore.field);
        }
    }

    fn handle_before_change(&self, field: &FieldId) {
        self.discard_abandoned_restore();
        if self.in_progress_undo.borrow().is_some() {
            tracing::trace!("Ignoring before-change on {field} during restore");
            return;
        }
        let starts_session = {
            let sessions = self.sessions.borrow();
            !sessions.current.contains_key(field) || !sessions.open.contains(field)
        };
        if starts_session {
            let state = self.capture_state(field);
            let mut sessions = self.sessions.borrow_mut();
            sessions.current.insert(field.clone(), state);
            sessions.open.insert(field.clone());
            tracing::trace!("Edit session opened on {field}");
        }
    }

    fn handle_delayed_change(&self, field: &FieldId) {
        self.discard_abandoned_restore();
        let finished = self.in_progress_undo.borrow_mut().take();
        if let Some(restore) = finished {
            tracing::debug!("Restore on {} settled", restore.field);
            restore.completion.complete();
            return;
        }

        let new_snapshot = self.observer.capture_snapshot(field);
        let existing = {
            let mut sessions = self.sessions.borrow_mut();
            sessions.open.remove(field);
            sessions.current.get(field).cloned()
        };
        let mut current = match existing {
            Some(state) => state,
            None => {
                let state = self.capture_state(field);
                self.sessions
                    .borrow_mut()
                    .current
                    .insert(field.clone(), state.clone());
                state
            }
        };

        if self.equivalent(current.undo_snapshot(), &new_snapshot) {
            tracing::trace!("No effective change on {field}");
            return;
        }

        let cursor = self.observer.capture_cursor(field);
        current.set_redo(new_snapshot.clone(), cursor);
        let next = EditState::new(field.clone(), new_snapshot, cursor, Rc::clone(&self.restore_callback));
        self.sessions
            .borrow_mut()
            .current
            .insert(field.clone(), next);

        tracing::debug!("Recording edit on {field}");
        let manager = self.manager.borrow().clone();
        manager.add_state(Rc::new(current));
    }

    fn restore(
        &self,
        state: &EditState,
        snapshot: &Snapshot,
        cursor: Option<&CursorSnapshot>,
        completion: ActionCompletion,
    ) {
        let field = state.field_id();
        if !self.sessions.borrow().attached.contains(field) {
            tracing::debug!("Field {field} is detached; skipping restore");
            completion.complete();
            return;
        }

        self.observer.flush_pending_change(field);
        self.observer.suspend_notifications(field);

        match self.observer.restore_snapshot(field, snapshot, cursor) {
            Ok(()) => {
                let mut sessions = self.sessions.borrow_mut();
                sessions.open.remove(field);
                sessions
                    .current
                    .entry(field.clone())
                    .and_modify(|current| current.set_undo(snapshot.clone(), cursor.copied()))
                    .or_insert_with(|| {
                        EditState::new(
                            field.clone(),
                            snapshot.clone(),
                            cursor.copied(),
                            Rc::clone(&self.restore_callback),
                        )
                    });
            }
            Err(e) => tracing::error!("Error while restoring undo state on {field}: {e:#}"),
        }

        // Always runs: the trailing delayed-change completes the action.
        *self.in_progress_undo.borrow_mut() = Some(InProgressRestore {
            field: field.clone(),
            completion,
        });
        self.observer.resume_notifications(field);
    }
}

/// Delivery endpoint handed to [`DocumentObserver::subscribe`].
///
/// Holds only a weak reference to the tracker; notifications sent after
/// the tracker is dropped are ignored.
#[derive(Clone)]
pub struct NotificationSink {
    field: FieldId,
    tracker: Weak<TrackerCore>,
}

impl fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSink")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl NotificationSink {
    pub fn notify(&self, notification: Notification) {
        if let Some(core) = self.tracker.upgrade() {
            core.handle(&self.field, notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::memory::MemoryFieldHost;
    use crate::state::StateRef;

    fn setup(content: &str) -> (Rc<MemoryFieldHost>, UndoRedoManager, EditSessionTracker, FieldId) {
        let host = Rc::new(MemoryFieldHost::new());
        let field = FieldId::from("body");
        host.add_field(field.clone(), content);
        let manager = UndoRedoManager::new(HistoryConfig::default());
        let tracker = EditSessionTracker::new(manager.clone(), host.clone());
        tracker.enable(&field);
        (host, manager, tracker, field)
    }

    fn as_edit(state: &StateRef) -> &EditState {
        state
            .as_any()
            .downcast_ref::<EditState>()
            .expect("edit state")
    }

    #[test]
    fn test_enable_captures_baseline() {
        let (_host, _manager, tracker, field) = setup("start");
        let current = tracker.current_state(&field).expect("baseline");
        assert_eq!(current.undo_snapshot().content(), "start");
        assert!(current.redo_snapshot().is_none());
        assert!(tracker.is_enabled(&field));
    }

    #[test]
    fn test_burst_of_edits_coalesces() {
        let (host, manager, _tracker, field) = setup("");
        host.edit(&field, "hello", None);
        host.edit(&field, "hello world", None);
        host.settle(&field);

        assert_eq!(manager.undo_depth(), 1);
        let top = manager.undo_peek().expect("state");
        let state = as_edit(&top);
        assert_eq!(state.undo_snapshot().content(), "");
        assert_eq!(state.redo_snapshot().map(Snapshot::content), Some("hello world"));
    }

    #[test]
    fn test_commit_starts_new_baseline() {
        let (host, _manager, tracker, field) = setup("a");
        host.edit(&field, "ab", Some(CursorSnapshot::collapsed(2)));
        host.settle(&field);

        let current = tracker.current_state(&field).expect("current");
        assert_eq!(current.undo_snapshot().content(), "ab");
        assert_eq!(current.undo_cursor(), Some(&CursorSnapshot::collapsed(2)));
    }

    #[test]
    fn test_unchanged_content_is_not_recorded() {
        let (host, manager, _tracker, field) = setup("x");
        host.edit(&field, "xy", None);
        host.edit(&field, "x", None);
        host.settle(&field);
        assert!(!manager.has_undo_state());
    }

    #[test]
    fn test_before_change_ignored_while_restoring() {
        let (host, manager, tracker, field) = setup("");
        host.edit(&field, "one", None);
        host.settle(&field);

        manager.undo();
        assert!(tracker.is_restoring());
        assert_eq!(host.content(&field).as_deref(), Some(""));

        host.edit(&field, "typed during restore", None);
        let current = tracker.current_state(&field).expect("current");
        assert_eq!(current.undo_snapshot().content(), "");

        host.settle(&field);
        assert!(!tracker.is_restoring());
        assert!(!manager.is_action_in_progress());
    }

    #[test]
    fn test_restore_updates_baseline() {
        let (host, manager, tracker, field) = setup("a");
        host.edit(&field, "ab", None);
        host.settle(&field);
        manager.undo();
        host.settle(&field);

        let current = tracker.current_state(&field).expect("current");
        assert_eq!(current.undo_snapshot().content(), "a");
    }

    #[test]
    fn test_exec_and_query_command() {
        let (host, _manager, tracker, field) = setup("");
        assert!(!tracker.query_command_value(Command::Undo));

        host.edit(&field, "x", None);
        host.settle(&field);
        assert!(tracker.query_command_value(Command::Undo));

        tracker.exec_command(Command::Undo);
        host.settle(&field);
        assert!(tracker.query_command_value(Command::Redo));
        assert_eq!(host.content(&field).as_deref(), Some(""));

        tracker.exec_command(Command::Redo);
        host.settle(&field);
        assert_eq!(host.content(&field).as_deref(), Some("x"));
    }

    #[test]
    fn test_undo_command_commits_pending_edit_first() {
        let (host, manager, tracker, field) = setup("");
        host.edit(&field, "one", None);
        host.settle(&field);
        host.edit(&field, "one two", None);

        tracker.exec_command(Command::Undo);
        host.settle(&field);
        assert_eq!(host.content(&field).as_deref(), Some("one"));
        assert_eq!(manager.undo_depth(), 1);
        assert_eq!(manager.redo_depth(), 1);
    }

    #[test]
    fn test_set_manager_redirects_new_states() {
        let (host, first, tracker, field) = setup("");
        let second = UndoRedoManager::new(HistoryConfig::default());
        tracker.set_manager(second.clone());

        host.edit(&field, "x", None);
        host.settle(&field);
        assert!(!first.has_undo_state());
        assert!(second.has_undo_state());
    }

    #[test]
    fn test_refresh_current_state() {
        let (host, manager, tracker, field) = setup("old");
        host.set_content_silently(&field, "external");
        tracker.refresh_current_state(&field);

        let current = tracker.current_state(&field).expect("current");
        assert_eq!(current.undo_snapshot().content(), "external");
        assert!(!manager.has_undo_state());
    }

    #[test]
    fn test_sink_outlives_tracker() {
        let (host, manager, tracker, field) = setup("");
        drop(tracker);
        host.edit(&field, "x", None);
        host.settle(&field);
        assert!(!manager.has_undo_state());
    }
}
