use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::lifecycle::Shared;

/// Transient flags of a run, cleared every time an inferior is launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    stop: bool,
    named: BTreeSet<String>,
}

impl FlagSet {
    /// Clears every flag.
    pub fn clear(&mut self) {
        self.stop = false;
        self.named.clear();
    }

    /// Whether the current inferior should be aborted.
    pub const fn stop(&self) -> bool {
        self.stop
    }

    /// Requests the current inferior to be aborted and cleaned up.
    pub fn set_stop(&mut self) {
        self.stop = true;
    }

    /// Whether a named flag is set.
    pub fn get(&self, name: &str) -> bool {
        self.named.contains(name)
    }

    /// Sets a named flag.
    pub fn set(&mut self, name: impl Into<String>) {
        self.named.insert(name.into());
    }
}

/// Handle over the flags of a session.
///
/// The flags are guarded by the lock of the lifecycle state machine the
/// session is attached to, so that they can be raised from any thread.
#[derive(Clone, Default)]
pub struct Flags {
    shared: Arc<Shared>,
}

impl Flags {
    pub(crate) fn bind(&mut self, shared: Arc<Shared>) {
        self.shared = shared;
    }

    fn with<R>(&self, f: impl FnOnce(&mut FlagSet) -> R) -> R {
        self.shared.with_slots(|slots| f(&mut slots.flags))
    }

    /// Returns a copy of the flags.
    pub fn snapshot(&self) -> FlagSet {
        self.with(|flags| flags.clone())
    }

    /// Whether the current inferior should be aborted.
    pub fn stop(&self) -> bool {
        self.with(|flags| flags.stop())
    }

    /// Requests the current inferior to be aborted and cleaned up.
    pub fn set_stop(&self) {
        self.with(FlagSet::set_stop);
    }

    /// Whether a named flag is set.
    pub fn get(&self, name: &str) -> bool {
        self.with(|flags| flags.get(name))
    }

    /// Sets a named flag.
    pub fn set(&self, name: impl Into<String>) {
        let name = name.into();
        self.with(|flags| flags.set(name));
    }

    /// Clears every flag.
    pub fn clear(&self) {
        self.with(FlagSet::clear);
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Flags").field(&self.snapshot()).finish()
    }
}
