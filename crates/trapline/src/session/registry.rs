use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::{IndexMap, IndexSet};

use super::Event;
use super::dispatch::CallContext;
use super::host::Host;
use super::options::HookOptions;
use crate::abi::{ArgType, Value};
use crate::addr::Addr;
use crate::backend::Process;
use crate::error::{Error, Result};

pub(crate) type HandlerCell<F> = Arc<Mutex<Box<F>>>;

/// Handler of lifecycle and signal events.
pub(crate) type EventFn = HandlerCell<dyn FnMut(&mut Host<'_>, &Event) -> Result<()> + Send>;

/// Handler of address hooks and mockups, receiving the `regset` values.
pub(crate) type AddrFn = HandlerCell<dyn FnMut(&mut Host<'_>, &[u64]) -> Result<()> + Send>;

/// Handler of function hooks.
pub(crate) type FunctionFn =
    HandlerCell<dyn FnMut(&mut Host<'_>, &CallContext, u64, &[Value]) -> Result<()> + Send>;

pub(crate) fn cell<F: ?Sized>(handler: Box<F>) -> HandlerCell<F> {
    Arc::new(Mutex::new(handler))
}

/// Locks a handler, even if a previous call panicked.
pub(crate) fn lock<F: ?Sized>(handler: &HandlerCell<F>) -> MutexGuard<'_, Box<F>> {
    handler.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opaque handle of a registered handler, used for removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    key: HandleKey,
    id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HandleKey {
    Event(Event),
    Addr(Addr),
    Mockup(Addr),
    Skip(Addr),
    Function(Addr),
}

#[derive(Clone)]
pub(crate) struct AddrHook {
    id: u64,
    pub handler: AddrFn,
    pub options: HookOptions,
}

#[derive(Clone)]
pub(crate) struct Mockup {
    id: u64,
    pub handler: AddrFn,
    pub jump: Addr,
    pub options: HookOptions,
}

#[derive(Clone)]
pub(crate) struct Skip {
    id: u64,
    pub jump: Addr,
    pub options: HookOptions,
}

#[derive(Clone)]
pub(crate) struct FunctionHook {
    id: u64,
    pub handler: FunctionFn,
    pub args: Vec<ArgType>,
    pub options: HookOptions,
}

/// Hooks matching a resolved stop address, in dispatch order.
pub(crate) struct Matches {
    pub addrs: Vec<AddrHook>,
    pub functions: Vec<FunctionHook>,
    pub mockup: Option<Mockup>,
    pub skip: Option<Skip>,
}

/// Handler tables of a session.
#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    events: IndexMap<Event, Vec<(u64, EventFn)>>,
    addrs: IndexMap<Addr, Vec<AddrHook>>,
    mockups: IndexMap<Addr, Mockup>,
    skips: IndexMap<Addr, Skip>,
    functions: IndexMap<Addr, FunctionHook>,
    hits: HashMap<u64, u64>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_event(&mut self, event: Event, handler: EventFn) -> Handle {
        let id = self.next_id();
        self.events
            .entry(event.clone())
            .or_default()
            .push((id, handler));

        Handle {
            key: HandleKey::Event(event),
            id,
        }
    }

    pub fn add_addr(&mut self, addr: Addr, handler: AddrFn, options: HookOptions) -> Handle {
        let id = self.next_id();
        self.addrs.entry(addr.clone()).or_default().push(AddrHook {
            id,
            handler,
            options,
        });

        Handle {
            key: HandleKey::Addr(addr),
            id,
        }
    }

    pub fn add_mockup(
        &mut self,
        addr: Addr,
        jump: Addr,
        handler: AddrFn,
        options: HookOptions,
    ) -> Handle {
        let id = self.next_id();
        self.mockups.insert(
            addr.clone(),
            Mockup {
                id,
                handler,
                jump,
                options,
            },
        );

        Handle {
            key: HandleKey::Mockup(addr),
            id,
        }
    }

    pub fn add_skip(&mut self, addr: Addr, jump: Addr, options: HookOptions) -> Handle {
        let id = self.next_id();
        self.skips
            .insert(addr.clone(), Skip { id, jump, options });

        Handle {
            key: HandleKey::Skip(addr),
            id,
        }
    }

    pub fn add_function(
        &mut self,
        addr: Addr,
        args: Vec<ArgType>,
        handler: FunctionFn,
        options: HookOptions,
    ) -> Handle {
        let id = self.next_id();
        self.functions.insert(
            addr.clone(),
            FunctionHook {
                id,
                handler,
                args,
                options,
            },
        );

        Handle {
            key: HandleKey::Function(addr),
            id,
        }
    }

    /// Removes a handler, returning whether it was still registered.
    pub fn remove(&mut self, handle: &Handle) -> bool {
        let id = handle.id;

        match &handle.key {
            HandleKey::Event(event) => remove_from_list(&mut self.events, event, |(i, _)| *i == id),
            HandleKey::Addr(addr) => remove_from_list(&mut self.addrs, addr, |hook| hook.id == id),
            HandleKey::Mockup(addr) => remove_single(&mut self.mockups, addr, |m| m.id == id),
            HandleKey::Skip(addr) => remove_single(&mut self.skips, addr, |s| s.id == id),
            HandleKey::Function(addr) => remove_single(&mut self.functions, addr, |f| f.id == id),
        }
    }

    /// Snapshot of the handlers of an event.
    pub fn event_handlers(&self, event: &Event) -> Vec<EventFn> {
        self.events
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    /// Resolves every registered address and returns the hooks matching
    /// `pc`.
    ///
    /// Symbols that can't be resolved yet (e.g., registered while the
    /// inferior runs, in a library not loaded yet) match nothing.
    pub fn matching<P: Process + ?Sized>(&self, process: &P, pc: u64) -> Result<Matches> {
        let is_pc = |addr: &Addr| match addr.value(process) {
            Ok(value) => Ok(value == pc),
            Err(Error::SymbolNotFound(symbol)) => {
                tracing::warn!(%addr, %symbol, "unresolved hook address, skipped");
                Ok(false)
            }
            Err(e) => Err(e),
        };

        let mut matches = Matches {
            addrs: Vec::new(),
            functions: Vec::new(),
            mockup: None,
            skip: None,
        };

        for (addr, hooks) in &self.addrs {
            if is_pc(addr)? {
                matches.addrs.extend(hooks.iter().cloned());
            }
        }

        for (addr, hook) in &self.functions {
            if is_pc(addr)? {
                matches.functions.push(hook.clone());
            }
        }

        for (addr, mockup) in &self.mockups {
            if matches.mockup.is_none() && is_pc(addr)? {
                matches.mockup = Some(mockup.clone());
            }
        }

        for (addr, skip) in &self.skips {
            if matches.skip.is_none() && is_pc(addr)? {
                matches.skip = Some(skip.clone());
            }
        }

        Ok(matches)
    }

    /// Resolves the addresses breakpoints are needed at.
    pub fn break_addrs<P: Process + ?Sized>(&self, process: &P) -> Result<IndexSet<u64>> {
        self.addrs
            .keys()
            .chain(self.mockups.keys())
            .chain(self.functions.keys())
            .chain(self.skips.keys())
            .map(|addr| addr.value(process))
            .collect()
    }

    pub fn hit_count(&self, addr: u64) -> u64 {
        self.hits.get(&addr).copied().unwrap_or(0)
    }

    pub fn record_hit(&mut self, addr: u64) {
        *self.hits.entry(addr).or_default() += 1;
    }
}

fn remove_from_list<K, T>(
    map: &mut IndexMap<K, Vec<T>>,
    key: &K,
    is_target: impl Fn(&T) -> bool,
) -> bool
where
    K: std::hash::Hash + Eq,
{
    let Some(list) = map.get_mut(key) else {
        return false;
    };

    let Some(pos) = list.iter().position(is_target) else {
        return false;
    };

    list.remove(pos);

    if list.is_empty() {
        map.shift_remove(key);
    }

    true
}

fn remove_single<K, T>(map: &mut IndexMap<K, T>, key: &K, is_target: impl Fn(&T) -> bool) -> bool
where
    K: std::hash::Hash + Eq,
{
    if map.get(key).is_some_and(is_target) {
        map.shift_remove(key);
        true
    } else {
        false
    }
}
