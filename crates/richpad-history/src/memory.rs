/// In-memory field host implementing [`DocumentObserver`].
///
/// Models an editor surface with debounced change notifications: every
/// edit fires before-change immediately and leaves a delayed-change
/// pending until [`settle`](MemoryFieldHost::settle) is called, standing in
/// for the debounce timer.
use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::observer::{DocumentObserver, Notification};
use crate::snapshot::{CursorSnapshot, FieldId, Snapshot};
use crate::tracker::NotificationSink;

#[derive(Debug, Default)]
struct MemoryField {
    content: String,
    cursor: Option<CursorSnapshot>,
    pending_change: bool,
    suspended: bool,
    sink: Option<NotificationSink>,
}

#[derive(Debug, Default)]
pub struct MemoryFieldHost {
    fields: RefCell<BTreeMap<FieldId, MemoryField>>,
    placeholder: Option<String>,
}

impl MemoryFieldHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose fields treat `placeholder` as blank content.
    pub fn with_placeholder(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: Some(placeholder.into()),
            ..Self::default()
        }
    }

    pub fn add_field(&self, field: FieldId, content: &str) {
        self.fields.borrow_mut().insert(
            field,
            MemoryField {
                content: content.to_string(),
                ..MemoryField::default()
            },
        );
    }

    pub fn has_field(&self, field: &FieldId) -> bool {
        self.fields.borrow().contains_key(field)
    }

    pub fn content(&self, field: &FieldId) -> Option<String> {
        self.fields.borrow().get(field).map(|f| f.content.clone())
    }

    pub fn cursor(&self, field: &FieldId) -> Option<CursorSnapshot> {
        self.fields.borrow().get(field).and_then(|f| f.cursor)
    }

    /// Applies a user edit: fires before-change, replaces the content and
    /// leaves a delayed-change pending. Suspended fields change silently.
    pub fn edit(&self, field: &FieldId, content: &str, cursor: Option<CursorSnapshot>) {
        let sink = self.active_sink(field);
        if let Some(sink) = &sink {
            sink.notify(Notification::BeforeChange);
        }

        let mut fields = self.fields.borrow_mut();
        let Some(entry) = fields.get_mut(field) else {
            tracing::warn!("Edit on unknown field {field}");
            return;
        };
        entry.content = content.to_string();
        entry.cursor = cursor;
        if !entry.suspended {
            entry.pending_change = true;
        }
    }

    /// Replaces content without any notification (an external mutation).
    pub fn set_content_silently(&self, field: &FieldId, content: &str) {
        if let Some(entry) = self.fields.borrow_mut().get_mut(field) {
            entry.content = content.to_string();
        }
    }

    /// Fires the field's pending delayed-change, if any.
    pub fn settle(&self, field: &FieldId) {
        let sink = {
            let mut fields = self.fields.borrow_mut();
            match fields.get_mut(field) {
                Some(entry) if entry.pending_change && !entry.suspended => {
                    entry.pending_change = false;
                    entry.sink.clone()
                }
                _ => None,
            }
        };
        if let Some(sink) = sink {
            sink.notify(Notification::DelayedChange);
        }
    }

    /// Settles every field, repeating until no change is pending.
    pub fn settle_all(&self) {
        loop {
            let pending: Vec<FieldId> = self
                .fields
                .borrow()
                .iter()
                .filter(|(_, f)| f.pending_change && !f.suspended)
                .map(|(id, _)| id.clone())
                .collect();
            if pending.is_empty() {
                break;
            }
            for field in &pending {
                self.settle(field);
            }
        }
    }

    pub fn has_pending_change(&self, field: &FieldId) -> bool {
        self.fields
            .borrow()
            .get(field)
            .is_some_and(|f| f.pending_change)
    }

    /// The field loses focus.
    pub fn blur(&self, field: &FieldId) {
        if let Some(sink) = self.active_sink(field) {
            sink.notify(Notification::Blur);
        }
    }

    fn active_sink(&self, field: &FieldId) -> Option<NotificationSink> {
        self.fields
            .borrow()
            .get(field)
            .filter(|f| !f.suspended)
            .and_then(|f| f.sink.clone())
    }
}

impl DocumentObserver for MemoryFieldHost {
    fn capture_snapshot(&self, field: &FieldId) -> Snapshot {
        match self.fields.borrow().get(field) {
            Some(entry) => Snapshot::new(entry.content.clone()),
            None => {
                tracing::warn!("Snapshot of unknown field {field}");
                Snapshot::default()
            }
        }
    }

    fn capture_cursor(&self, field: &FieldId) -> Option<CursorSnapshot> {
        self.cursor(field)
    }

    fn restore_snapshot(
        &self,
        field: &FieldId,
        snapshot: &Snapshot,
        cursor: Option<&CursorSnapshot>,
    ) -> Result<()> {
        let mut fields = self.fields.borrow_mut();
        let Some(entry) = fields.get_mut(field) else {
            bail!("Unknown field {field}");
        };
        entry.content = snapshot.content().to_string();
        if let Some(cursor) = cursor {
            entry.cursor = Some(*cursor);
        }
        Ok(())
    }

    fn is_canonically_empty(&self, snapshot: &Snapshot) -> bool {
        snapshot.is_empty() || self.placeholder.as_deref() == Some(snapshot.content())
    }

    fn subscribe(&self, field: &FieldId, sink: NotificationSink) {
        if let Some(entry) = self.fields.borrow_mut().get_mut(field) {
            entry.sink = Some(sink);
        }
    }

    fn unsubscribe(&self, field: &FieldId) {
        if let Some(entry) = self.fields.borrow_mut().get_mut(field) {
            entry.sink = None;
        }
    }

    fn flush_pending_change(&self, field: &FieldId) {
        self.settle(field);
    }

    fn suspend_notifications(&self, field: &FieldId) {
        if let Some(entry) = self.fields.borrow_mut().get_mut(field) {
            entry.suspended = true;
        }
    }

    fn resume_notifications(&self, field: &FieldId) {
        if let Some(entry) = self.fields.borrow_mut().get_mut(field) {
            entry.suspended = false;
            entry.pending_change = true;
        }
    }
}
