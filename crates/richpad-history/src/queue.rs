/// FIFO serializer for pending undo/redo actions.
///
/// At most one action is in flight at a time. Synchronous actions never
/// occupy the in-flight slot; asynchronous ones hold it until their
/// completion is reported with the matching [`ActionId`].
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::event::UndoRedoEvent;
use crate::state::StateRef;

/// Direction of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Undo,
    Redo,
}

impl ActionKind {
    /// The cancelable event announcing an action of this kind.
    pub fn before_event(self, state: StateRef) -> UndoRedoEvent {
        match self {
            Self::Undo => UndoRedoEvent::BeforeUndo { state },
            Self::Redo => UndoRedoEvent::BeforeRedo { state },
        }
    }
}

/// Identifies one invocation of a state's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u64);

/// An action waiting for its turn.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub state: StateRef,
}

/// The asynchronous action currently awaiting completion.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub id: ActionId,
    pub kind: ActionKind,
    pub state: StateRef,
    pub started: Instant,
}

#[derive(Default)]
pub struct ActionQueue {
    pending: VecDeque<PendingAction>,
    in_flight: Option<InFlight>,
    next_id: u64,
    timeout: Option<Duration>,
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight.as_ref().map(|a| (a.id, a.kind)))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ActionQueue {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn enqueue(&mut self, kind: ActionKind, state: StateRef) {
        self.pending.push_back(PendingAction { kind, state });
    }

    /// Dequeues the front action, unless an action is still in flight.
    pub fn next_ready(&mut self) -> Option<PendingAction> {
        if self.in_flight.is_some() {
            return None;
        }
        self.pending.pop_front()
    }

    /// Allocates an id for a synchronous invocation.
    pub fn allocate_id(&mut self) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Marks `action` as the in-flight asynchronous action.
    pub fn begin(&mut self, action: &PendingAction, now: Instant) -> ActionId {
        let id = self.allocate_id();
        self.in_flight = Some(InFlight {
            id,
            kind: action.kind,
            state: Rc::clone(&action.state),
            started: now,
        });
        id
    }

    /// Clears the in-flight slot if `id` is the action occupying it.
    ///
    /// Returns `None` for stale or duplicate completions.
    pub fn finish(&mut self, id: ActionId) -> Option<InFlight> {
        match &self.in_flight {
            Some(current) if current.id == id => self.in_flight.take(),
            _ => None,
        }
    }

    /// The in-flight action's id if it has exceeded the configured
    /// timeout. Always `None` when no timeout is configured.
    pub fn stalled(&self, now: Instant) -> Option<ActionId> {
        let timeout = self.timeout?;
        let current = self.in_flight.as_ref()?;
        (now.saturating_duration_since(current.started) >= timeout).then_some(current.id)
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
