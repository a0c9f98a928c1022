/// Core undo/redo manager.
///
/// Owns a bounded undo stack, a redo stack, and the action queue that
/// serializes undo/redo actions. Stack transitions happen immediately when
/// `undo`/`redo` is called; the state's own action runs when the queue
/// reaches it.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use crate::config::HistoryConfig;
use crate::event::{Dispatch, ListenerId, Listeners, UndoRedoEvent};
use crate::queue::{ActionId, ActionKind, ActionQueue};
use crate::state::StateRef;

/// Manages the undo and redo stacks for one editor.
///
/// Cloning yields another handle to the same manager. All handles live on
/// one thread; listeners and state actions may call back into the manager.
#[derive(Clone)]
pub struct UndoRedoManager {
    core: Rc<ManagerCore>,
}

#[derive(Default)]
struct ManagerCore {
    stacks: RefCell<Stacks>,
    queue: RefCell<ActionQueue>,
    listeners: Listeners,
    /// Set while the action queue is being drained.
    draining: Cell<bool>,
}

#[derive(Default)]
struct Stacks {
    /// Oldest first; the top is the back.
    undo: VecDeque<StateRef>,
    /// Most recently undone on top (back).
    redo: VecDeque<StateRef>,
    max_undo_depth: usize,
}

impl fmt::Debug for UndoRedoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = self.core.stacks.borrow();
        f.debug_struct("UndoRedoManager")
            .field("undo_len", &stacks.undo.len())
            .field("redo_len", &stacks.redo.len())
            .field("max_undo_depth", &stacks.max_undo_depth)
            .field("queue", &*self.core.queue.borrow())
            .field("listeners", &self.core.listeners.len())
            .finish()
    }
}

impl Default for UndoRedoManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl UndoRedoManager {
    pub fn new(config: HistoryConfig) -> Self {
        let core = ManagerCore {
            stacks: RefCell::new(Stacks {
                max_undo_depth: clamp_depth(config.max_undo_depth),
                ..Stacks::default()
            }),
            queue: RefCell::new(ActionQueue::new(config.action_timeout())),
            ..ManagerCore::default()
        };
        Self {
            core: Rc::new(core),
        }
    }

    /// Pushes a new state onto the undo stack.
    ///
    /// A state equal to the current top is discarded. A successful push
    /// evicts the oldest entries beyond `max_undo_depth` and clears the
    /// redo stack. Never queued: applies immediately even while an
    /// asynchronous action is in flight.
    pub fn add_state(&self, state: StateRef) {
        let availability_changed = {
            let mut stacks = self.core.stacks.borrow_mut();
            if let Some(top) = stacks.undo.back() {
                if state.equals(top.as_ref()) {
                    tracing::trace!("Discarding state equal to the top of the undo stack");
                    return;
                }
            }

            let was_empty = stacks.undo.is_empty();
            stacks.undo.push_back(Rc::clone(&state));
            while stacks.undo.len() > stacks.max_undo_depth {
                stacks.undo.pop_front();
                tracing::debug!("Evicted oldest undo state (depth {})", stacks.max_undo_depth);
            }

            let had_redo = !stacks.redo.is_empty();
            stacks.redo.clear();
            (was_empty && !stacks.undo.is_empty()) || had_redo
        };

        self.core.emit(&UndoRedoEvent::StateAdded { state });
        if availability_changed {
            self.core.emit(&UndoRedoEvent::StateChange);
        }
    }

    /// Moves the top undo state to the redo stack and queues its undo action.
    ///
    /// No-op when there is nothing to undo.
    pub fn undo(&self) {
        self.shift(ActionKind::Undo);
    }

    /// Moves the top redo state to the undo stack and queues its redo action.
    ///
    /// No-op when there is nothing to redo.
    pub fn redo(&self) {
        self.shift(ActionKind::Redo);
    }

    fn shift(&self, kind: ActionKind) {
        let availability_changed = {
            let mut stacks = self.core.stacks.borrow_mut();
            let Stacks { undo, redo, .. } = &mut *stacks;
            let (from, to) = match kind {
                ActionKind::Undo => (undo, redo),
                ActionKind::Redo => (redo, undo),
            };
            let Some(state) = from.pop_back() else {
                tracing::trace!("Nothing to {kind:?}");
                return;
            };
            to.push_back(Rc::clone(&state));
            self.core.queue.borrow_mut().enqueue(kind, state);
            from.is_empty() || to.len() == 1
        };

        self.core.drain_queue();
        if availability_changed {
            self.core.emit(&UndoRedoEvent::StateChange);
        }
    }

    pub fn has_undo_state(&self) -> bool {
        !self.core.stacks.borrow().undo.is_empty()
    }

    pub fn has_redo_state(&self) -> bool {
        !self.core.stacks.borrow().redo.is_empty()
    }

    /// The state `undo` would act on next.
    pub fn undo_peek(&self) -> Option<StateRef> {
        self.core.stacks.borrow().undo.back().cloned()
    }

    /// The state `redo` would act on next.
    pub fn redo_peek(&self) -> Option<StateRef> {
        self.core.stacks.borrow().redo.back().cloned()
    }

    pub fn undo_depth(&self) -> usize {
        self.core.stacks.borrow().undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.core.stacks.borrow().redo.len()
    }

    /// Empties both stacks. Pending and in-flight actions are unaffected.
    pub fn clear_history(&self) {
        let had_states = {
            let mut stacks = self.core.stacks.borrow_mut();
            let had_states = !stacks.undo.is_empty() || !stacks.redo.is_empty();
            stacks.undo.clear();
            stacks.redo.clear();
            had_states
        };
        if had_states {
            tracing::debug!("Cleared undo/redo history");
            self.core.emit(&UndoRedoEvent::StateChange);
        }
    }

    /// Sets the undo stack bound, at least 1. An already oversized stack
    /// is trimmed on the next push, not here.
    pub fn set_max_undo_depth(&self, depth: usize) {
        self.core.stacks.borrow_mut().max_undo_depth = clamp_depth(depth);
    }

    pub fn max_undo_depth(&self) -> usize {
        self.core.stacks.borrow().max_undo_depth
    }

    /// Registers a listener for all manager events.
    ///
    /// Returning [`Dispatch::Canceled`] from a `BeforeUndo`/`BeforeRedo`
    /// event suppresses that state's action. The state has already moved
    /// between stacks by then and stays moved.
    pub fn subscribe(&self, listener: impl Fn(&UndoRedoEvent) -> Dispatch + 'static) -> ListenerId {
        self.core.listeners.subscribe(Rc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.core.listeners.unsubscribe(id)
    }

    pub fn pending_action_count(&self) -> usize {
        self.core.queue.borrow().pending_len()
    }

    /// Whether an asynchronous action is awaiting completion.
    pub fn is_action_in_progress(&self) -> bool {
        self.core.queue.borrow().in_flight().is_some()
    }

    /// Abandons the in-flight action if it has exceeded the configured
    /// action timeout, then resumes the queue.
    ///
    /// Returns `true` if an action was abandoned. Without a configured
    /// timeout this never abandons anything.
    pub fn check_stalled(&self) -> bool {
        self.check_stalled_at(Instant::now())
    }

    pub fn check_stalled_at(&self, now: Instant) -> bool {
        let stalled = self.core.queue.borrow().stalled(now);
        let Some(id) = stalled else {
            return false;
        };
        tracing::warn!("Abandoning undo/redo action {id:?} after timeout");
        self.core.finish_action(id);
        true
    }
}

impl ManagerCore {
    fn emit(&self, event: &UndoRedoEvent) -> Dispatch {
        self.listeners.dispatch(event)
    }

    /// Runs queued actions until the queue is empty or an asynchronous
    /// action is in flight. Re-entrant calls return immediately; the
    /// outermost call picks up whatever they enqueued.
    fn drain_queue(self: &Rc<Self>) {
        if self.draining.replace(true) {
            return;
        }
        let _guard = DrainGuard(&self.draining);

        loop {
            let next = self.queue.borrow_mut().next_ready();
            let Some(action) = next else {
                break;
            };

            let event = action.kind.before_event(Rc::clone(&action.state));
            if self.emit(&event) == Dispatch::Canceled {
                tracing::debug!("{:?} action canceled by listener", action.kind);
                continue;
            }

            let id = {
                let mut queue = self.queue.borrow_mut();
                if action.state.is_asynchronous() {
                    queue.begin(&action, Instant::now())
                } else {
                    queue.allocate_id()
                }
            };
            let completion = ActionCompletion {
                id,
                core: Rc::downgrade(self),
            };
            tracing::debug!("Running {:?} action {id:?}", action.kind);
            match action.kind {
                ActionKind::Undo => action.state.undo(completion),
                ActionKind::Redo => action.state.redo(completion),
            }
        }
    }

    fn finish_action(self: &Rc<Self>, id: ActionId) -> bool {
        let finished = self.queue.borrow_mut().finish(id);
        match finished {
            Some(action) => {
                tracing::debug!("{:?} action {id:?} completed", action.kind);
                self.drain_queue();
                true
            }
            None => {
                tracing::trace!("Ignoring completion for action {id:?} not in flight");
                false
            }
        }
    }
}

fn clamp_depth(depth: usize) -> usize {
    if depth == 0 {
        tracing::warn!("max_undo_depth must be at least 1; using 1");
        return 1;
    }
    depth
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Completion signal handed to a state's `undo`/`redo` action.
///
/// Asynchronous states report the end of their action through it; the
/// manager then resumes the action queue. Only the first signal for an
/// in-flight action counts; later ones, and any signal from a synchronous
/// action, are ignored.
#[derive(Clone)]
pub struct ActionCompletion {
    id: ActionId,
    core: Weak<ManagerCore>,
}

impl fmt::Debug for ActionCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCompletion")
            .field("id", &self.id)
            .finish()
    }
}

impl ActionCompletion {
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Whether the manager is still waiting on this action.
    ///
    /// `false` once the action completed, failed, or was abandoned by the
    /// action timeout, and for synchronous actions.
    pub fn is_pending(&self) -> bool {
        self.core.upgrade().is_some_and(|core| {
            core.queue
                .borrow()
                .in_flight()
                .is_some_and(|action| action.id == self.id)
        })
    }

    /// Signals that the action finished.
    ///
    /// Returns `true` if this released the in-flight slot.
    pub fn complete(&self) -> bool {
        match self.core.upgrade() {
            Some(core) => core.finish_action(self.id),
            None => false,
        }
    }

    /// Signals that the action failed. The failure is logged and the
    /// queue resumes as if the action had completed.
    pub fn fail(&self, error: anyhow::Error) -> bool {
        tracing::error!("Undo/redo action {:?} failed: {error:#}", self.id);
        self.complete()
    }
}
