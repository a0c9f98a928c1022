/// The document-side collaborator consumed by the edit session tracker.
use anyhow::Result;

use crate::snapshot::{CursorSnapshot, FieldId, Snapshot};
use crate::tracker::NotificationSink;

/// Raw edit notifications delivered to a [`NotificationSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The field is about to change.
    BeforeChange,
    /// A burst of changes has settled (debounced change).
    DelayedChange,
    /// The field lost focus.
    Blur,
}

/// Captures, restores, and observes the content of editable fields.
///
/// Implementations may deliver notifications to a subscribed sink
/// synchronously from within any of these methods; the tracker never holds
/// internal borrows across a call into the observer.
pub trait DocumentObserver {
    fn capture_snapshot(&self, field: &FieldId) -> Snapshot;

    fn capture_cursor(&self, field: &FieldId) -> Option<CursorSnapshot>;

    /// Replaces the field's content (and selection, if given).
    ///
    /// # Errors
    ///
    /// Returns an error if the field cannot be updated.
    fn restore_snapshot(
        &self,
        field: &FieldId,
        snapshot: &Snapshot,
        cursor: Option<&CursorSnapshot>,
    ) -> Result<()>;

    /// Whether `snapshot` counts as blank content (e.g. empty, or showing
    /// only placeholder text). Blank snapshots compare equal to each other.
    fn is_canonically_empty(&self, snapshot: &Snapshot) -> bool {
        snapshot.is_empty()
    }

    /// Routes the field's notifications to `sink`, replacing any
    /// previous subscription.
    fn subscribe(&self, field: &FieldId, sink: NotificationSink);

    fn unsubscribe(&self, field: &FieldId);

    /// Fires a pending debounced delayed-change immediately, if any.
    fn flush_pending_change(&self, field: &FieldId);

    fn suspend_notifications(&self, field: &FieldId);

    /// Resumes notifications and re-arms a delayed-change for the field.
    fn resume_notifications(&self, field: &FieldId);
}
