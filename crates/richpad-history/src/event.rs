/// Manager lifecycle events and the listener registry that delivers them.
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::state::StateRef;

/// Outcome of dispatching an event to all listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    #[default]
    Allowed,
    /// At least one listener vetoed a cancelable event.
    Canceled,
}

/// Events emitted by [`UndoRedoManager`](crate::UndoRedoManager).
#[derive(Debug, Clone)]
pub enum UndoRedoEvent {
    /// Undo or redo availability may have changed.
    StateChange,
    /// A new state was pushed onto the undo stack.
    StateAdded { state: StateRef },
    /// An undo action is about to run. Cancelable.
    BeforeUndo { state: StateRef },
    /// A redo action is about to run. Cancelable.
    BeforeRedo { state: StateRef },
}

impl UndoRedoEvent {
    pub fn is_cancelable(&self) -> bool {
        matches!(self, Self::BeforeUndo { .. } | Self::BeforeRedo { .. })
    }

    /// The state carried by the event, if any.
    pub fn state(&self) -> Option<&StateRef> {
        match self {
            Self::StateChange => None,
            Self::StateAdded { state } | Self::BeforeUndo { state } | Self::BeforeRedo { state } => {
                Some(state)
            }
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Rc<dyn Fn(&UndoRedoEvent) -> Dispatch>;

/// Ordered listener registry.
///
/// Dispatch iterates over a copy of the registered listeners, so a
/// listener may subscribe, unsubscribe, or call back into the manager.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RefCell<Vec<(ListenerId, Listener)>>,
    next_id: Cell<u64>,
}

impl Listeners {
    pub(crate) fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Delivers `event` to every listener.
    ///
    /// All listeners run even after one cancels. Non-cancelable events
    /// always report [`Dispatch::Allowed`].
    pub(crate) fn dispatch(&self, event: &UndoRedoEvent) -> Dispatch {
        let listeners: Vec<Listener> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        let mut outcome = Dispatch::Allowed;
        for listener in listeners {
            if listener(event) == Dispatch::Canceled {
                outcome = Dispatch::Canceled;
            }
        }

        if event.is_cancelable() {
            outcome
        } else {
            Dispatch::Allowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let listeners = Listeners::default();
        let a = listeners.subscribe(Rc::new(|_: &UndoRedoEvent| Dispatch::Allowed));
        let b = listeners.subscribe(Rc::new(|_: &UndoRedoEvent| Dispatch::Allowed));
        assert_ne!(a, b);
        assert_eq!(listeners.len(), 2);

        assert!(listeners.unsubscribe(a));
        assert!(!listeners.unsubscribe(a));
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_state_change_cannot_be_canceled() {
        let listeners = Listeners::default();
        listeners.subscribe(Rc::new(|_: &UndoRedoEvent| Dispatch::Canceled));
        assert_eq!(
            listeners.dispatch(&UndoRedoEvent::StateChange),
            Dispatch::Allowed
        );
        assert!(!UndoRedoEvent::StateChange.is_cancelable());
        assert!(UndoRedoEvent::StateChange.state().is_none());
    }

    #[test]
    fn test_every_listener_runs_after_a_cancel() {
        let calls = Rc::new(Cell::new(0));
        let listeners = Listeners::default();
        for outcome in [Dispatch::Canceled, Dispatch::Allowed] {
            let calls = Rc::clone(&calls);
            listeners.subscribe(Rc::new(move |_: &UndoRedoEvent| {
                calls.set(calls.get() + 1);
                outcome
            }));
        }

        let event = UndoRedoEvent::StateChange;
        listeners.dispatch(&event);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_dispatch() {
        let listeners = Rc::new(Listeners::default());
        let own_id = Rc::new(Cell::new(None));
        let id = {
            let registry = Rc::clone(&listeners);
            let own_id = Rc::clone(&own_id);
            listeners.subscribe(Rc::new(move |_: &UndoRedoEvent| {
                if let Some(id) = own_id.get() {
                    registry.unsubscribe(id);
                }
                Dispatch::Allowed
            }))
        };
        own_id.set(Some(id));

        listeners.dispatch(&UndoRedoEvent::StateChange);
        assert_eq!(listeners.len(), 0);
    }
}
