/// The reversible state contract stored on the undo and redo stacks.
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::manager::ActionCompletion;

/// Shared handle to a state. The same state object moves between the
/// undo and redo stacks and is handed to event listeners.
pub type StateRef = Rc<dyn UndoRedoState>;

/// A reversible state: an undo/redo action pair plus value equality.
///
/// Synchronous states finish their effect before `undo`/`redo` return and
/// may drop the [`ActionCompletion`] they are given. Asynchronous states
/// must call [`ActionCompletion::complete`] (or
/// [`ActionCompletion::fail`]) exactly once per invoked action; the
/// manager runs no further queued action until they do.
pub trait UndoRedoState: fmt::Debug {
    /// Whether `undo`/`redo` finish after the call returns.
    /// Fixed for the lifetime of the state.
    fn is_asynchronous(&self) -> bool {
        false
    }

    /// Performs the reverse action.
    fn undo(&self, completion: ActionCompletion);

    /// Performs the forward action.
    fn redo(&self, completion: ActionCompletion);

    /// Value equality used to suppress no-op history entries.
    ///
    /// Must be total and symmetric. States of a different concrete type
    /// compare unequal.
    fn equals(&self, other: &dyn UndoRedoState) -> bool;

    /// Upcast used by `equals` implementations to downcast `other`.
    fn as_any(&self) -> &dyn Any;
}
