use super::Session;
use crate::backend::{Instruction, Process};
use crate::controller::{Control, StepMode};
use crate::error::{Error, Result};

/// Context handed to every handler.
///
/// It gives read access to the inferior (when there is one) and to the
/// session. The inferior can only be mutated from a procedure scheduled
/// with [with_inferior](Self::with_inferior), which runs once the inferior
/// is confirmed stopped.
pub struct Host<'a> {
    pub(crate) session: &'a mut Session,
    pub(crate) process: Option<&'a mut (dyn Process + 'static)>,
    pub(crate) control: &'a mut Control,
    mutable: bool,
}

impl<'a> Host<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        process: Option<&'a mut (dyn Process + 'static)>,
        control: &'a mut Control,
    ) -> Self {
        Self {
            session,
            process,
            control,
            mutable: false,
        }
    }

    /// Creates the context of a deferred procedure, allowed to mutate the
    /// inferior.
    pub(crate) fn stopped(
        session: &'a mut Session,
        process: Option<&'a mut (dyn Process + 'static)>,
        control: &'a mut Control,
    ) -> Self {
        Self {
            mutable: true,
            ..Self::new(session, process, control)
        }
    }

    /// Session being run.
    pub fn session(&self) -> &Session {
        &*self.session
    }

    /// Session being run, e.g., to remove handlers or register new ones.
    ///
    /// Breakpoints of newly registered addresses are installed at the next
    /// iteration.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut *self.session
    }

    /// Whether an inferior is live.
    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Read access to the inferior.
    pub fn process(&self) -> Result<&(dyn Process + 'static)> {
        self.process.as_deref().ok_or(Error::NoProcess)
    }

    /// Write access to the inferior.
    ///
    /// Only available from a procedure scheduled with
    /// [with_inferior](Self::with_inferior).
    pub fn process_mut(&mut self) -> Result<&mut (dyn Process + 'static)> {
        if !self.mutable {
            return Err(Error::UnsafeMutation);
        }

        self.process.as_deref_mut().ok_or(Error::NoProcess)
    }

    /// Schedules a procedure mutating the inferior.
    ///
    /// Procedures run in FIFO order once the inferior is stopped, before
    /// any further dispatch. Fails if no inferior is live.
    pub fn with_inferior<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Host<'_>) -> Result<()> + 'static,
    {
        if self.process.is_none() {
            return Err(Error::NoProcess);
        }

        self.control.deferred.push_back(Box::new(f));

        Ok(())
    }

    /// Suspends the run at the next opportunity, leaving the inferior alive.
    pub fn set_drop_into_cli(&mut self) {
        self.control.drop_into_cli = true;
    }

    /// Aborts the current inferior, which is then cleaned up.
    pub fn set_flag_stop(&self) {
        self.session.flags().set_stop();
    }

    /// Sets a named transient flag.
    pub fn set_flag(&self, name: impl Into<String>) {
        self.session.flags().set(name);
    }

    /// Whether a named transient flag is set.
    pub fn flag(&self, name: &str) -> bool {
        self.session.flags().get(name)
    }

    /// Current step mode.
    pub fn step_mode(&self) -> StepMode {
        self.control.step_mode
    }

    /// Advances the inferior one instruction at a time, entering calls.
    pub fn enter_step_into_mode(&mut self) {
        tracing::debug!("enter step-into mode");
        self.control.step_mode = StepMode::Into;
    }

    /// Advances the inferior one instruction at a time, stepping over
    /// calls.
    pub fn enter_step_over_mode(&mut self) {
        tracing::debug!("enter step-over mode");
        self.control.step_mode = StepMode::Over;
    }

    /// Lets the inferior run until the next stop.
    pub fn exit_step_mode(&mut self) {
        tracing::debug!("exit step mode");
        self.control.step_mode = StepMode::Off;
    }

    /// Current iteration (starting at 1 once the first inferior started).
    pub fn iteration(&self) -> u64 {
        self.session.iteration()
    }

    /// Reads a register of the inferior.
    pub fn reg(&self, name: &str) -> Result<u64> {
        Ok(self.process()?.read_register(name)?)
    }

    /// Reads the instruction address of the inferior.
    pub fn pc(&self) -> Result<u64> {
        Ok(self.process()?.instr_addr()?)
    }

    /// Disassembles `count` instructions of the inferior at `addr`.
    pub fn disassemble(&self, addr: u64, count: usize) -> Result<Vec<Instruction>> {
        Ok(self.process()?.disassemble(addr, count)?)
    }
}
