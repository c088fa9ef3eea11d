mod command;
#[cfg(test)]
pub(crate) mod fake;
mod stdio;

pub use self::command::LaunchCommand;
pub use self::stdio::{IoConfig, IoDirection, Stdio};
use crate::error::BackendError;

/// Trait implementing the launching logic of a process-control backend.
pub trait Backend {
    /// Launches a process with the given command line.
    ///
    /// The process is launched in a **suspended** state, before its first
    /// instruction is executed.
    fn launch(&mut self, command: &LaunchCommand) -> Result<Box<dyn Process>, BackendError>;
}

/// Opaque token identifying a breakpoint installed by a [Process].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointToken(pub u64);

/// How a stopped process should be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeMode {
    /// Runs until the next stop.
    #[default]
    Continue,

    /// Executes a single instruction, entering calls.
    StepInto,

    /// Executes a single instruction, stepping over calls.
    StepOver,
}

/// Event describing some action taking place within the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The process started (or resumed) executing.
    ///
    /// This event doesn't stop the process. It is reported once per call to
    /// [Process::resume], before the stop that follows.
    Started,

    /// The process stopped by triggering a breakpoint.
    Breakpoint,

    /// The process stopped after single-stepping.
    Stepped,

    /// The process stopped by receiving a signal.
    Signal(String),

    /// The process has exited.
    Exited {
        /// Exit code of the process.
        exit_code: i32,
    },
}

/// Disassembled CPU instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address the instruction was disassembled from.
    pub addr: u64,

    /// CPU instruction opcodes.
    pub opcodes: Vec<u8>,

    /// Textual representation of the instruction.
    pub text: String,
}

/// Trait implementing the instrumentation logic of a process-control
/// backend.
///
/// Every method but [resume](Self::resume) and [wait_event](Self::wait_event)
/// assumes that the process is stopped.
pub trait Process: Send {
    /// Returns the process ID.
    fn pid(&self) -> u64;

    /// Returns whether the process is still alive.
    fn is_alive(&self) -> bool;

    /// Returns the address of the program entry point.
    fn entry_point(&self) -> Result<u64, BackendError>;

    /// Looks up the address of a symbol.
    fn symbol_address(&self, name: &str) -> Result<Option<u64>, BackendError>;

    /// Adds a breakpoint at the given address of the process's address space.
    fn add_breakpoint(&mut self, addr: u64) -> Result<BreakpointToken, BackendError>;

    /// Removes a previously added breakpoint.
    fn remove_breakpoint(&mut self, token: BreakpointToken) -> Result<(), BackendError>;

    /// Reads a named register.
    fn read_register(&self, name: &str) -> Result<u64, BackendError>;

    /// Writes a named register.
    fn write_register(&mut self, name: &str, value: u64) -> Result<(), BackendError>;

    /// Returns the instruction address.
    fn instr_addr(&self) -> Result<u64, BackendError>;

    /// Modifies the instruction address.
    fn set_instr_addr(&mut self, addr: u64) -> Result<(), BackendError>;

    /// Returns the stack pointer.
    fn stack_addr(&self) -> Result<u64, BackendError>;

    /// Modifies the stack pointer.
    fn set_stack_addr(&mut self, addr: u64) -> Result<(), BackendError>;

    /// Reads data from the process's address space.
    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<(), BackendError>;

    /// Writes data to the process's address space.
    fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<(), BackendError>;

    /// Resumes the process's execution.
    fn resume(&mut self, mode: ResumeMode) -> Result<(), BackendError>;

    /// Returns the next process event.
    fn wait_event(&mut self) -> Result<ProcessEvent, BackendError>;

    /// Kills the process.
    fn kill(&mut self) -> Result<(), BackendError>;

    /// Disassembles `count` instructions starting at `addr`.
    fn disassemble(&self, addr: u64, count: usize) -> Result<Vec<Instruction>, BackendError>;
}
