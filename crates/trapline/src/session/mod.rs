mod dispatch;
mod event;
mod flags;
mod host;
mod options;
mod registry;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexSet;

pub use self::dispatch::CallContext;
pub use self::event::Event;
pub use self::flags::{FlagSet, Flags};
pub use self::host::Host;
pub use self::options::HookOptions;
pub use self::registry::Handle;
use self::registry::{Registry, cell};
use crate::abi::{ArgType, Convention, ConventionKind, DataLayout, Endian, StackGrowth, Value};
use crate::addr::IntoAddr;
use crate::backend::{LaunchCommand, Process};
use crate::error::Result;

/// Instrumentation session.
///
/// A session holds what is needed to launch the inferior, along with
/// every handler to dispatch while it runs. It is iterated (i.e., the
/// inferior is relaunched) until its iteration limit is reached.
pub struct Session {
    command: LaunchCommand,
    limit: u64,
    pub(crate) iteration: u64,
    pub(crate) finished: bool,
    layout: DataLayout,
    convention: Option<Arc<Convention>>,
    pub(crate) registry: Registry,
    flags: Flags,
}

impl Session {
    /// Creates a session launching `target`, with an iteration limit of 1.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self::with_command(LaunchCommand::new(target))
    }

    /// Creates a session from a launch command.
    pub fn with_command(command: LaunchCommand) -> Self {
        Self {
            command,
            limit: 1,
            iteration: 0,
            finished: false,
            layout: DataLayout::default(),
            convention: None,
            registry: Registry::default(),
            flags: Flags::default(),
        }
    }

    /// Sets the iteration limit (0 means unlimited).
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Adds arguments to pass to the target.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = self.command.args(args);
        self
    }

    /// Launch command of the inferior.
    pub const fn command(&self) -> &LaunchCommand {
        &self.command
    }

    /// Launch command of the inferior, e.g., to redirect its streams.
    pub fn command_mut(&mut self) -> &mut LaunchCommand {
        &mut self.command
    }

    /// Iteration limit (0 means unlimited).
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Sets the iteration limit (0 means unlimited).
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Number of inferiors launched so far.
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Whether the session is done iterating.
    pub const fn finished(&self) -> bool {
        self.finished
    }

    /// Marks the session as done iterating.
    ///
    /// Once finished, a session stays finished.
    pub fn set_finished(&mut self) {
        self.finished = true;
    }

    /// Data layout of the inferior.
    pub const fn layout(&self) -> DataLayout {
        self.layout
    }

    /// Sets the byte order of the inferior.
    ///
    /// The calling convention, if any, follows the new layout.
    pub fn set_endian(&mut self, endian: Endian) {
        self.layout.endian = endian;
        self.sync_convention();
    }

    /// Sets the stack growth direction of the inferior.
    ///
    /// The calling convention, if any, follows the new layout.
    pub fn set_stack_growth(&mut self, stack: StackGrowth) {
        self.layout.stack = stack;
        self.sync_convention();
    }

    fn sync_convention(&mut self) {
        if let Some(convention) = &mut self.convention {
            Arc::make_mut(convention).set_layout(self.layout);
        }
    }

    /// Calling convention used by function hooks, if any.
    pub fn convention(&self) -> Option<&Arc<Convention>> {
        self.convention.as_ref()
    }

    /// Sets the calling convention used by function hooks.
    pub fn set_convention(&mut self, convention: Convention) {
        self.convention = Some(Arc::new(convention));
    }

    /// Selects a built-in calling convention, built for the current data
    /// layout.
    pub fn use_convention(&mut self, kind: ConventionKind) -> Result<()> {
        let convention = Convention::from_kind(kind, self.layout)?;
        tracing::debug!(name = convention.name(), "calling convention");

        self.set_convention(convention);

        Ok(())
    }

    /// Transient flags of the current run.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    /// Clears the transient flags.
    pub fn clear_flags(&self) {
        self.flags.clear();
    }

    /// Registers a handler of `event`.
    ///
    /// Handlers of the same event fire in registration order.
    pub fn on<F>(&mut self, event: Event, handler: F) -> Handle
    where
        F: FnMut(&mut Host<'_>, &Event) -> Result<()> + Send + 'static,
    {
        self.registry.add_event(event, cell(Box::new(handler)))
    }

    /// Registers a handler fired whenever the inferior reaches `addr`.
    ///
    /// The handler receives the values of the `regset` registers.
    pub fn at<F>(&mut self, addr: impl IntoAddr, options: HookOptions, handler: F) -> Result<Handle>
    where
        F: FnMut(&mut Host<'_>, &[u64]) -> Result<()> + Send + 'static,
    {
        let addr = addr.into_addr()?;
        Ok(self
            .registry
            .add_addr(addr, cell(Box::new(handler)), options))
    }

    /// Registers a mockup: whenever the inferior reaches `addr`, the
    /// handler fires and execution is redirected to `jump`.
    ///
    /// A mockup replaces any other mockup registered at `addr`.
    pub fn mockup<F>(
        &mut self,
        addr: impl IntoAddr,
        jump: impl IntoAddr,
        options: HookOptions,
        handler: F,
    ) -> Result<Handle>
    where
        F: FnMut(&mut Host<'_>, &[u64]) -> Result<()> + Send + 'static,
    {
        let addr = addr.into_addr()?;
        let jump = jump.into_addr()?;

        Ok(self
            .registry
            .add_mockup(addr, jump, cell(Box::new(handler)), options))
    }

    /// Registers a skip: whenever the inferior reaches `addr`, execution is
    /// redirected to `jump`.
    ///
    /// A skip is ignored at addresses where a mockup is registered.
    pub fn skip(
        &mut self,
        addr: impl IntoAddr,
        jump: impl IntoAddr,
        options: HookOptions,
    ) -> Result<Handle> {
        let addr = addr.into_addr()?;
        let jump = jump.into_addr()?;

        Ok(self.registry.add_skip(addr, jump, options))
    }

    /// Registers a function hook: whenever the inferior enters the function
    /// at `addr`, the handler fires with the call context, the number of
    /// previous hits, and the arguments marshaled as `args`.
    pub fn at_function<F>(
        &mut self,
        addr: impl IntoAddr,
        args: &[ArgType],
        options: HookOptions,
        handler: F,
    ) -> Result<Handle>
    where
        F: FnMut(&mut Host<'_>, &CallContext, u64, &[Value]) -> Result<()> + Send + 'static,
    {
        let addr = addr.into_addr()?;

        Ok(self
            .registry
            .add_function(addr, args.to_vec(), cell(Box::new(handler)), options))
    }

    /// Removes a handler, returning whether it was still registered.
    ///
    /// When called from a handler, the removal applies from the next
    /// dispatch.
    pub fn remove(&mut self, handle: &Handle) -> bool {
        self.registry.remove(handle)
    }

    /// Number of times the inferior stopped at `addr`, across iterations.
    pub fn hit_count(&self, addr: u64) -> u64 {
        self.registry.hit_count(addr)
    }

    pub(crate) fn break_addrs<P: Process + ?Sized>(&self, process: &P) -> Result<IndexSet<u64>> {
        self.registry.break_addrs(process)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("command", &self.command)
            .field("limit", &self.limit)
            .field("iteration", &self.iteration)
            .field("finished", &self.finished)
            .field("layout", &self.layout)
            .field("convention", &self.convention.as_ref().map(|c| c.name()))
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
