/// Undo/redo engine for rich-text editing surfaces.
///
/// Provides an `UndoRedoManager` holding bounded undo/redo stacks of
/// reversible states with a serialized action queue, and an
/// `EditSessionTracker` that coalesces a field's raw change notifications
/// into one `EditState` per edit session.
pub mod config;
pub mod edit_state;
pub mod event;
pub mod manager;
pub mod memory;
pub mod observer;
pub mod queue;
pub mod snapshot;
pub mod state;
pub mod tracker;

pub use config::HistoryConfig;
pub use edit_state::{EditState, RestoreCallback};
pub use event::{Dispatch, ListenerId, UndoRedoEvent};
pub use manager::{ActionCompletion, UndoRedoManager};
pub use memory::MemoryFieldHost;
pub use observer::{DocumentObserver, Notification};
pub use queue::{ActionId, ActionKind, ActionQueue, PendingAction};
pub use snapshot::{CursorSnapshot, FieldId, Snapshot};
pub use state::{StateRef, UndoRedoState};
pub use tracker::{Command, EditSessionTracker, NotificationSink};
