use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};
use crate::session::{FlagSet, Session};

/// State of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No script is loaded.
    Init,

    /// A script is loaded and runs on its worker thread.
    Imported,

    /// The script failed (or returned) before running any session.
    ExecFail,

    /// A session was handed over to the event thread.
    Session,

    /// An inferior of the session is running.
    Running,

    /// The run was suspended, with the inferior left alive.
    Stopped,

    /// The session is done iterating and was handed back to the script.
    Finished,
}

impl State {
    /// Whether `self -> to` is a declared edge of the lifecycle.
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Init, Self::Imported)
                | (Self::Imported, Self::Session | Self::ExecFail)
                | (Self::ExecFail, Self::Init)
                | (Self::Session, Self::Running)
                | (Self::Running, Self::Stopped | Self::Session | Self::Finished)
                | (Self::Stopped, Self::Running)
                | (Self::Finished, Self::Session | Self::Init)
        )
    }
}

/// Edge selector of a transition callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Matches `from -> to` only.
    Exact(State, State),

    /// Matches any transition leaving the state.
    From(State),

    /// Matches any transition entering the state.
    To(State),
}

/// Transition callback. Returning `false` unregisters it.
type Callback = Box<dyn FnMut(State, State) -> bool + Send>;

/// Data exchanged between the event thread and the script worker.
#[derive(Default)]
pub(crate) struct Slots {
    pub flags: FlagSet,
    pub mailbox: Option<Session>,
    pub failure: Option<Error>,
}

struct Core {
    state: State,
    round: u64,
    slots: Slots,
    callbacks: HashMap<Edge, Vec<(u64, Callback)>>,
    next_id: u64,
    transitioning: Option<ThreadId>,
}

impl Default for Core {
    fn default() -> Self {
        Self {
            state: State::Init,
            round: 0,
            slots: Slots::default(),
            callbacks: HashMap::new(),
            next_id: 0,
            transitioning: None,
        }
    }
}

/// Lock-protected core of a [Machine].
#[derive(Default)]
pub(crate) struct Shared {
    core: Mutex<Core>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_slots<R>(&self, f: impl FnOnce(&mut Slots) -> R) -> R {
        f(&mut self.lock().slots)
    }
}

/// Clears the transitioning marker, even if a callback panics.
struct Transitioning<'a>(&'a Shared);

impl Drop for Transitioning<'_> {
    fn drop(&mut self) {
        self.0.lock().transitioning = None;
        self.0.changed.notify_all();
    }
}

/// State machine of the session lifecycle.
///
/// Transitions are serialized: a thread requesting a transition while
/// another one is running its callbacks waits for it to complete.
#[derive(Clone, Default)]
pub struct Machine {
    shared: Arc<Shared>,
}

impl Machine {
    /// Creates a machine in the [Init](State::Init) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.shared.lock().state
    }

    /// Number of times the machine went back to [Init](State::Init).
    pub fn round(&self) -> u64 {
        self.shared.lock().round
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Transitions to `to`, returning the previous state.
    pub fn transition(&self, to: State) -> Result<State> {
        self.transition_with(to, |_| Ok(()))
    }

    /// Transitions to `to`, running `effect` under the lock right before
    /// committing. The transition is cancelled if `effect` fails.
    pub(crate) fn transition_with<F>(&self, to: State, effect: F) -> Result<State>
    where
        F: FnOnce(&mut Slots) -> Result<()>,
    {
        let me = thread::current().id();

        let mut core = self.shared.lock();

        if core.transitioning == Some(me) {
            return Err(Error::ReentrantTransition);
        }

        core = self
            .shared
            .changed
            .wait_while(core, |core| core.transitioning.is_some())
            .unwrap_or_else(PoisonError::into_inner);

        let from = core.state;

        if !from.can_transition_to(to) {
            return Err(Error::IllegalTransition { from, to });
        }

        effect(&mut core.slots)?;

        core.state = to;
        if to == State::Init {
            core.round += 1;
        }

        tracing::debug!(?from, ?to, round = core.round, "lifecycle transition");

        core.transitioning = Some(me);
        let _guard = Transitioning(&self.shared);

        let mut buckets = [Edge::Exact(from, to), Edge::From(from), Edge::To(to)]
            .into_iter()
            .filter_map(|edge| core.callbacks.remove(&edge).map(|cbs| (edge, cbs)))
            .collect::<Vec<_>>();

        drop(core);

        for (_, callbacks) in &mut buckets {
            callbacks.retain_mut(|(_, cb)| cb(from, to));
        }

        let mut core = self.shared.lock();

        for (edge, callbacks) in buckets {
            // callbacks registered meanwhile come after the older ones
            let entry = core.callbacks.entry(edge).or_default();
            let newer = std::mem::replace(entry, callbacks);
            entry.extend(newer);

            if entry.is_empty() {
                core.callbacks.remove(&edge);
            }
        }

        Ok(from)
    }

    /// Registers a callback fired after every transition matching `edge`,
    /// until it returns `false`.
    ///
    /// Callbacks run on the transitioning thread, outside of the lock, and
    /// can't request transitions themselves.
    pub fn observe<F>(&self, edge: Edge, callback: F)
    where
        F: FnMut(State, State) -> bool + Send + 'static,
    {
        let mut core = self.shared.lock();

        core.next_id += 1;
        let id = core.next_id;

        core.callbacks
            .entry(edge)
            .or_default()
            .push((id, Box::new(callback)));
    }

    /// Registers a one-shot wait on the next transition matching `edge`.
    pub fn wait_for(&self, edge: Edge) -> Waiter {
        let (tx, rx) = mpsc::channel();

        self.observe(edge, move |from, to| {
            let _ = tx.send((from, to));
            false
        });

        Waiter { rx }
    }

    /// Blocks until `pred(state, round)` holds, outside of any transition.
    pub(crate) fn wait_until<F>(&self, mut pred: F) -> (State, u64)
    where
        F: FnMut(State, u64) -> bool,
    {
        let core = self
            .shared
            .changed
            .wait_while(self.shared.lock(), |core| {
                core.transitioning.is_some() || !pred(core.state, core.round)
            })
            .unwrap_or_else(PoisonError::into_inner);

        (core.state, core.round)
    }

    /// Unregisters every callback, failing the pending waits.
    pub(crate) fn clear_callbacks(&self) {
        let callbacks = std::mem::take(&mut self.shared.lock().callbacks);
        drop(callbacks);
    }
}

/// Pending one-shot wait, see [Machine::wait_for].
#[derive(Debug)]
pub struct Waiter {
    rx: mpsc::Receiver<(State, State)>,
}

impl Waiter {
    /// Blocks until the awaited transition happens, returning its edge.
    pub fn wait(self) -> Result<(State, State)> {
        self.rx.recv().map_err(|_| Error::Disconnected)
    }
}
