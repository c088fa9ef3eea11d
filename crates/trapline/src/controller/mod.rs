mod deferred;

use indexmap::IndexMap;

pub(crate) use self::deferred::Control;
pub use self::deferred::StepMode;
use crate::backend::{Backend, BreakpointToken, Process, ProcessEvent};
use crate::error::{Error, Result};
use crate::session::{Event, Host, Session};

/// Outcome of a run of the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// A handler requested the run to be suspended. The inferior is stopped
    /// and can be resumed with [continue_loop](ExecutionController::continue_loop).
    Suspended,

    /// The inferior is gone (exited, or aborted with the stop flag).
    Terminated {
        /// Exit code of the inferior, if it exited by itself.
        exit_code: Option<i32>,
    },
}

/// State of the inferior, as seen from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No inferior was launched (or it was cleaned up).
    NoProcess,

    /// The inferior is stopped.
    Stopped,

    /// The inferior is dead, but not cleaned up yet.
    Dead,
}

/// Drives one inferior at a time, translating the backend's events into
/// session dispatches.
///
/// The controller can be reused across runs, even after a failed one.
pub struct ExecutionController<B> {
    backend: B,
    process: Option<Box<dyn Process>>,
    breakpoints: IndexMap<u64, BreakpointToken>,
    control: Control,
    about_to_start: bool,
    exit_code: Option<i32>,
}

impl<B: Backend> ExecutionController<B> {
    /// Creates a controller launching inferiors with `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            process: None,
            breakpoints: IndexMap::new(),
            control: Control::default(),
            about_to_start: false,
            exit_code: None,
        }
    }

    /// Process-control backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Process-control backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Launches a new inferior for `session` and runs it until it
    /// terminates or a handler suspends the run.
    ///
    /// A suspended inferior left over from a previous run is discarded.
    #[tracing::instrument(
        name = "Run",
        skip_all,
        fields(target = %session.command().program.display(), iteration = session.iteration() + 1)
    )]
    pub fn run(&mut self, session: &mut Session) -> Result<RunStatus> {
        if self.process.is_some() {
            tracing::warn!("discarding suspended inferior");
            self.abort();
        }

        session.clear_flags();
        self.control.reset();
        self.about_to_start = true;
        self.exit_code = None;

        self.host(session).notify_event(&Event::Run)?;

        let command = session.command();
        let process = self
            .backend
            .launch(command)
            .map_err(|e| Error::Launch(command.program.clone(), e))?;

        tracing::info!(pid = process.pid(), "inferior launched");

        self.process = Some(process);

        if let Err(e) = self.set_breakpoints(session) {
            tracing::error!(error = %e, "failed to set breakpoints");
            self.abort();
            return Err(e);
        }

        self.continue_loop(session)
    }

    /// Runs the current inferior until it terminates or a handler suspends
    /// the run.
    ///
    /// On failure, pending mutations are discarded and the inferior is
    /// killed, without dispatching any further event.
    #[tracing::instrument(name = "Continue", skip_all)]
    pub fn continue_loop(&mut self, session: &mut Session) -> Result<RunStatus> {
        self.continue_inner(session).inspect_err(|e| {
            tracing::error!(error = %e, "run aborted");
            self.abort();
        })
    }

    fn continue_inner(&mut self, session: &mut Session) -> Result<RunStatus> {
        while self.process.as_ref().is_some_and(|p| p.is_alive()) && !session.flags().stop() {
            self.flush(session)?;

            if self.control.drop_into_cli {
                self.control.drop_into_cli = false;

                tracing::info!("run suspended");
                return Ok(RunStatus::Suspended);
            }

            self.advance(session)?;
        }

        self.clear_process(session)?;

        Ok(RunStatus::Terminated {
            exit_code: self.exit_code,
        })
    }

    /// Schedules a procedure mutating the inferior.
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

    /// Suspends the run at the next opportunity.
    pub fn set_drop_into_cli(&mut self) {
        self.control.drop_into_cli = true;
    }

    /// Dispatches [Event::Finish], once `session` is done iterating.
    pub fn finish(&mut self, session: &mut Session) -> Result<()> {
        self.host(session).notify_event(&Event::Finish).map(|_| ())
    }

    /// State of the current inferior.
    pub fn process_state(&self) -> ProcessState {
        match &self.process {
            None => ProcessState::NoProcess,
            Some(p) if p.is_alive() => ProcessState::Stopped,
            Some(_) => ProcessState::Dead,
        }
    }

    /// Exit code of the last inferior, if it exited by itself.
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn host<'a>(&'a mut self, session: &'a mut Session) -> Host<'a> {
        Host::new(session, self.process.as_deref_mut(), &mut self.control)
    }

    fn process(&mut self) -> Result<&mut (dyn Process + 'static)> {
        self.process.as_deref_mut().ok_or(Error::NoProcess)
    }

    #[tracing::instrument(name = "Breakpoints", skip_all)]
    fn set_breakpoints(&mut self, session: &Session) -> Result<()> {
        let process = self.process.as_deref_mut().ok_or(Error::NoProcess)?;

        let mut addrs = session.break_addrs(&*process)?;
        addrs.insert(process.entry_point()?);

        for addr in addrs {
            if self.breakpoints.contains_key(&addr) {
                continue;
            }

            let token = process
                .add_breakpoint(addr)
                .map_err(|source| Error::Breakpoint { addr, source })?;

            tracing::debug!(addr = format_args!("{addr:#x}"), "breakpoint set");

            self.breakpoints.insert(addr, token);
        }

        Ok(())
    }

    /// Runs the pending mutations, in FIFO order.
    fn flush(&mut self, session: &mut Session) -> Result<()> {
        while let Some(f) = self.control.deferred.pop_front() {
            let mut host = Host::stopped(session, self.process.as_deref_mut(), &mut self.control);
            f(&mut host)?;
        }

        Ok(())
    }

    fn advance(&mut self, session: &mut Session) -> Result<()> {
        let step_mode = self.control.step_mode;

        let process = self.process()?;
        let pc_before = process.instr_addr()?;

        process.resume(step_mode.resume_mode())?;

        loop {
            match self.process()?.wait_event()? {
                ProcessEvent::Started => {
                    self.on_start(session)?;
                    continue;
                }
                ProcessEvent::Breakpoint => self.on_break(session)?,
                ProcessEvent::Stepped => (),
                ProcessEvent::Signal(name) => self.on_stop(session, &name)?,
                ProcessEvent::Exited { exit_code } => self.on_exit(session, exit_code)?,
            }

            break;
        }

        if step_mode.is_stepping() {
            let process = self.process()?;

            if process.is_alive() && process.instr_addr()? != pc_before {
                self.host(session).notify_event(&Event::Step)?;
            }
        }

        Ok(())
    }

    fn on_start(&mut self, session: &mut Session) -> Result<()> {
        if std::mem::take(&mut self.about_to_start) {
            self.host(session).notify_event(&Event::InferiorPre)?;
        }

        self.host(session).notify_event(&Event::Start)?;

        Ok(())
    }

    fn on_break(&mut self, session: &mut Session) -> Result<()> {
        let process = self.process()?;
        let pc = process.instr_addr()?;

        if pc == process.entry_point()? {
            tracing::debug!(addr = format_args!("{pc:#x}"), "entry point reached");
            self.host(session).notify_event(&Event::Entry)?;
        }

        self.host(session).notify_addr(pc)?;

        Ok(())
    }

    fn on_stop(&mut self, session: &mut Session, signal: &str) -> Result<()> {
        tracing::info!(signal, "inferior signaled");

        if !self.host(session).notify_signal(signal)? {
            tracing::warn!(signal, "unhandled signal, suspending");
            self.control.drop_into_cli = true;
        }

        Ok(())
    }

    fn on_exit(&mut self, session: &mut Session, exit_code: i32) -> Result<()> {
        tracing::info!(exit_code, "inferior exited");

        self.exit_code = Some(exit_code);
        self.host(session).notify_event(&Event::Exit)?;

        Ok(())
    }

    /// Cleans up the current inferior, dispatching [Event::InferiorPost]
    /// while it is still reachable.
    fn clear_process(&mut self, session: &mut Session) -> Result<()> {
        let Some(process) = self.process.as_deref_mut() else {
            return Ok(());
        };

        if process.is_alive() {
            for (addr, token) in self.breakpoints.drain(..) {
                if let Err(e) = process.remove_breakpoint(token) {
                    tracing::warn!(addr = format_args!("{addr:#x}"), error = %e, "failed to remove breakpoint");
                }
            }

            if let Err(e) = process.kill() {
                tracing::warn!(error = %e, "failed to kill inferior");
            }
        }

        self.breakpoints.clear();

        let res = self.host(session).notify_event(&Event::InferiorPost);

        self.process = None;
        self.control.deferred.clear();

        res.map(|_| ())
    }

    /// Drops the current inferior without any dispatch.
    fn abort(&mut self) {
        self.control.deferred.clear();
        self.control.drop_into_cli = false;

        if let Some(mut process) = self.process.take() {
            if process.is_alive() {
                for (addr, token) in self.breakpoints.drain(..) {
                    if let Err(e) = process.remove_breakpoint(token) {
                        tracing::warn!(addr = format_args!("{addr:#x}"), error = %e, "failed to remove breakpoint");
                    }
                }

                if let Err(e) = process.kill() {
                    tracing::warn!(error = %e, "failed to kill inferior");
                }
            }
        }

        self.breakpoints.clear();
    }
}
