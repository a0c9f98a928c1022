/// The reversible state recorded for one coalesced edit session.
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::manager::ActionCompletion;
use crate::snapshot::{CursorSnapshot, FieldId, Snapshot};
use crate::state::UndoRedoState;

/// Applies a snapshot back to a field on behalf of an [`EditState`].
///
/// Receives the state being undone or redone, the snapshot and cursor to
/// restore, and the completion to signal once the restore has settled.
pub type RestoreCallback =
    Rc<dyn Fn(&EditState, &Snapshot, Option<&CursorSnapshot>, ActionCompletion)>;

/// Before/after snapshot pair for one edit session on one field.
///
/// The redo side stays empty while the session is open and is filled in
/// just before the state is pushed onto the undo stack.
#[derive(Clone)]
pub struct EditState {
    field_id: FieldId,
    undo_snapshot: Snapshot,
    undo_cursor: Option<CursorSnapshot>,
    redo_snapshot: Option<Snapshot>,
    redo_cursor: Option<CursorSnapshot>,
    restore: RestoreCallback,
}

impl fmt::Debug for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditState")
            .field("field_id", &self.field_id)
            .field("undo_snapshot", &self.undo_snapshot)
            .field("undo_cursor", &self.undo_cursor)
            .field("redo_snapshot", &self.redo_snapshot)
            .field("redo_cursor", &self.redo_cursor)
            .finish_non_exhaustive()
    }
}

impl EditState {
    pub fn new(
        field_id: FieldId,
        undo_snapshot: Snapshot,
        undo_cursor: Option<CursorSnapshot>,
        restore: RestoreCallback,
    ) -> Self {
        Self {
            field_id,
            undo_snapshot,
            undo_cursor,
            redo_snapshot: None,
            redo_cursor: None,
            restore,
        }
    }

    pub fn field_id(&self) -> &FieldId {
        &self.field_id
    }

    pub fn undo_snapshot(&self) -> &Snapshot {
        &self.undo_snapshot
    }

    pub fn undo_cursor(&self) -> Option<&CursorSnapshot> {
        self.undo_cursor.as_ref()
    }

    pub fn redo_snapshot(&self) -> Option<&Snapshot> {
        self.redo_snapshot.as_ref()
    }

    pub fn redo_cursor(&self) -> Option<&CursorSnapshot> {
        self.redo_cursor.as_ref()
    }

    /// Replaces the undo side, e.g. after a restore moved the field.
    pub fn set_undo(&mut self, snapshot: Snapshot, cursor: Option<CursorSnapshot>) {
        self.undo_snapshot = snapshot;
        self.undo_cursor = cursor;
    }

    /// Fills in the redo side when the session is committed.
    pub fn set_redo(&mut self, snapshot: Snapshot, cursor: Option<CursorSnapshot>) {
        self.redo_snapshot = Some(snapshot);
        self.redo_cursor = cursor;
    }
}

impl UndoRedoState for EditState {
    fn is_asynchronous(&self) -> bool {
        true
    }

    fn undo(&self, completion: ActionCompletion) {
        (self.restore)(self, &self.undo_snapshot, self.undo_cursor.as_ref(), completion);
    }

    fn redo(&self, completion: ActionCompletion) {
        match &self.redo_snapshot {
            Some(snapshot) => (self.restore)(self, snapshot, self.redo_cursor.as_ref(), completion),
            None => {
                tracing::warn!("Redo of uncommitted edit state on field {}", self.field_id);
                completion.complete();
            }
        }
    }

    /// Same field with equal undo and redo content; cursors are ignored.
    fn equals(&self, other: &dyn UndoRedoState) -> bool {
        other
            .as_any()
            .downcast_ref::<EditState>()
            .is_some_and(|other| {
                self.field_id == other.field_id
                    && self.undo_snapshot == other.undo_snapshot
                    && self.redo_snapshot == other.redo_snapshot
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::HistoryConfig;
    use crate::manager::UndoRedoManager;

    type Calls = Rc<RefCell<Vec<(String, Option<CursorSnapshot>)>>>;

    fn recording_restore(calls: &Calls) -> RestoreCallback {
        let calls = Rc::clone(calls);
        Rc::new(
            move |_state: &EditState,
                  snapshot: &Snapshot,
                  cursor: Option<&CursorSnapshot>,
                  completion: ActionCompletion| {
                calls
                    .borrow_mut()
                    .push((snapshot.content().to_string(), cursor.copied()));
                completion.complete();
            },
        )
    }

    fn committed(field: &str, undo: &str, redo: &str, restore: &RestoreCallback) -> EditState {
        let mut state = EditState::new(
            FieldId::from(field),
            Snapshot::from(undo),
            Some(CursorSnapshot::collapsed(undo.len())),
            Rc::clone(restore),
        );
        state.set_redo(Snapshot::from(redo), Some(CursorSnapshot::collapsed(redo.len())));
        state
    }

    #[test]
    fn test_new_state_has_no_redo_side() {
        let calls = Calls::default();
        let state = EditState::new(
            FieldId::from("body"),
            Snapshot::from("x"),
            None,
            recording_restore(&calls),
        );
        assert!(state.redo_snapshot().is_none());
        assert!(state.redo_cursor().is_none());
        assert_eq!(state.undo_snapshot().content(), "x");
        assert!(state.is_asynchronous());
    }

    #[test]
    fn test_equality_ignores_cursor() {
        let restore = recording_restore(&Calls::default());
        let a = committed("body", "", "hi", &restore);
        let mut b = committed("body", "", "hi", &restore);
        b.set_redo(Snapshot::from("hi"), Some(CursorSnapshot::collapsed(0)));
        assert!(a.equals(&b));
        assert!(b.equals(&a));
    }

    #[test]
    fn test_equality_requires_same_field_and_content() {
        let restore = recording_restore(&Calls::default());
        let a = committed("body", "", "hi", &restore);
        assert!(!a.equals(&committed("title", "", "hi", &restore)));
        assert!(!a.equals(&committed("body", "", "hey", &restore)));
        assert!(!a.equals(&committed("body", "-", "hi", &restore)));
    }

    #[test]
    fn test_undo_and_redo_invoke_restore() {
        let calls = Calls::default();
        let restore = recording_restore(&calls);
        let manager = UndoRedoManager::new(HistoryConfig::default());
        manager.add_state(Rc::new(committed("body", "a", "ab", &restore)));

        manager.undo();
        manager.redo();
        assert_eq!(
            *calls.borrow(),
            [
                ("a".to_string(), Some(CursorSnapshot::collapsed(1))),
                ("ab".to_string(), Some(CursorSnapshot::collapsed(2))),
            ]
        );
        assert!(!manager.is_action_in_progress());
    }

    #[test]
    fn test_redo_without_redo_side_completes() {
        let calls = Calls::default();
        let manager = UndoRedoManager::new(HistoryConfig::default());
        let state = EditState::new(
            FieldId::from("body"),
            Snapshot::from("a"),
            None,
            recording_restore(&calls),
        );
        manager.add_state(Rc::new(state));
        manager.undo();
        manager.redo();

        assert_eq!(calls.borrow().len(), 1);
        assert!(!manager.is_action_in_progress());
    }
}
