//! Session lifecycle.
//!
//! Scripts run on a worker thread and hand their sessions over to the event
//! thread, which owns the [ExecutionController] and performs every dispatch.
//! Both threads synchronize through a [Machine].

mod machine;
mod script;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) use self::machine::Shared;
pub use self::machine::{Edge, Machine, State, Waiter};
pub use self::script::{Script, ScriptContext};
use crate::backend::Backend;
use crate::controller::{ExecutionController, RunStatus};
use crate::error::{Error, Result};
use crate::session::Session;

/// Outcome of [run_script](SessionLifecycle::run_script) and
/// [resume](SessionLifecycle::resume).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The run was suspended, and can be resumed.
    Stopped,

    /// The script completed, and another one can be run.
    Idle,

    /// The script completed, in one-shot mode.
    Terminated,
}

/// Handle requesting the current inferior to be aborted, from any thread.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Raises the stop flag of the current run.
    pub fn stop(&self) {
        tracing::info!("stop requested");
        self.shared.with_slots(|slots| slots.flags.set_stop());
    }
}

/// Event-thread side of the session lifecycle.
pub struct SessionLifecycle<B> {
    machine: Machine,
    controller: ExecutionController<B>,
    worker: Option<JoinHandle<()>>,
    suspended: Option<Session>,
    one_shot: bool,
    round_start: u64,
}

impl<B: Backend> SessionLifecycle<B> {
    /// Creates a lifecycle launching inferiors with `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            machine: Machine::new(),
            controller: ExecutionController::new(backend),
            worker: None,
            suspended: None,
            one_shot: false,
            round_start: 0,
        }
    }

    /// Reports [Outcome::Terminated] instead of [Outcome::Idle] once a
    /// script completes.
    pub fn one_shot(mut self, one_shot: bool) -> Self {
        self.one_shot = one_shot;
        self
    }

    /// Lifecycle state machine.
    pub const fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.machine.state()
    }

    /// Number of completed rounds.
    pub fn round(&self) -> u64 {
        self.machine.round()
    }

    /// Execution controller.
    pub const fn controller(&self) -> &ExecutionController<B> {
        &self.controller
    }

    /// Registers a transition callback, see [Machine::observe].
    pub fn observe<F>(&self, edge: Edge, callback: F)
    where
        F: FnMut(State, State) -> bool + Send + 'static,
    {
        self.machine.observe(edge, callback);
    }

    /// Returns a handle aborting the current inferior.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.machine.shared().clone(),
        }
    }

    /// Session of the suspended run, if any.
    pub fn suspended(&self) -> Option<&Session> {
        self.suspended.as_ref()
    }

    /// Runs a script, then every session it hands over, until the script
    /// completes or a run is suspended.
    #[tracing::instrument(name = "Script", skip_all, fields(round = self.machine.round()))]
    pub fn run_script<S: Script>(&mut self, script: S) -> Result<Outcome> {
        self.round_start = self.machine.round();
        self.machine.transition(State::Imported)?;

        let machine = self.machine.clone();

        let worker = thread::Builder::new()
            .name("trapline-script".into())
            .spawn(move || script_worker(machine, script));

        match worker {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn script worker");
                self.machine.transition(State::ExecFail)?;
                self.machine.transition(State::Init)?;
                return Err(e.into());
            }
        }

        self.drive()
    }

    /// Resumes a suspended run.
    #[tracing::instrument(name = "Resume", skip_all)]
    pub fn resume(&mut self) -> Result<Outcome> {
        self.machine.transition(State::Running)?;

        let Some(mut session) = self.suspended.take() else {
            return Err(Error::NoSession);
        };

        let status = self.controller.continue_loop(&mut session);

        match self.iterate(session, status)? {
            Some(outcome) => Ok(outcome),
            None => self.drive(),
        }
    }

    /// Serves the script worker until the end of the round or a suspended
    /// run.
    fn drive(&mut self) -> Result<Outcome> {
        let round_start = self.round_start;

        loop {
            let (state, _) = self.machine.wait_until(|state, round| {
                round != round_start || matches!(state, State::Session | State::ExecFail)
            });

            match state {
                State::Session => {
                    let mut session = None;

                    self.machine.transition_with(State::Running, |slots| {
                        session = slots.mailbox.take();
                        Ok(())
                    })?;

                    let mut session = session.ok_or(Error::NoSession)?;
                    session.flags_mut().bind(self.machine.shared().clone());

                    let status = self.controller.run(&mut session);

                    if let Some(outcome) = self.iterate(session, status)? {
                        return Ok(outcome);
                    }
                }
                State::ExecFail => {
                    let mut failure = None;

                    self.machine.transition_with(State::Init, |slots| {
                        failure = slots.failure.take();
                        Ok(())
                    })?;

                    self.join();

                    return Err(failure.unwrap_or(Error::NoSession));
                }
                _ => {
                    self.join();

                    return match self.machine.shared().with_slots(|slots| slots.failure.take()) {
                        Some(e) => Err(e),
                        None if self.one_shot => Ok(Outcome::Terminated),
                        None => Ok(Outcome::Idle),
                    };
                }
            }
        }
    }

    /// Keeps iterating `session` until it is suspended (returning
    /// [Outcome::Stopped]), or until it finishes or fails (handing it back
    /// to the script).
    fn iterate(
        &mut self,
        mut session: Session,
        mut status: Result<RunStatus>,
    ) -> Result<Option<Outcome>> {
        loop {
            match status {
                Ok(RunStatus::Suspended) => {
                    self.machine.transition(State::Stopped)?;
                    self.suspended = Some(session);

                    return Ok(Some(Outcome::Stopped));
                }
                Ok(RunStatus::Terminated { .. }) if !session.finished() => {
                    tracing::debug!(iteration = session.iteration(), "next iteration");

                    self.machine.transition(State::Session)?;
                    self.machine.transition(State::Running)?;

                    status = self.controller.run(&mut session);
                }
                Ok(RunStatus::Terminated { .. }) => {
                    let failure = self.controller.finish(&mut session).err();
                    self.settle(session, failure)?;

                    return Ok(None);
                }
                Err(e) => {
                    self.settle(session, Some(e))?;

                    return Ok(None);
                }
            }
        }
    }

    /// Hands `session` back to the script.
    fn settle(&mut self, session: Session, failure: Option<Error>) -> Result<()> {
        if let Some(e) = &failure {
            tracing::error!(error = %e, "session failed");
        }

        self.machine.transition_with(State::Finished, move |slots| {
            slots.mailbox = Some(session);
            slots.failure = failure;
            Ok(())
        })?;

        Ok(())
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("script worker panicked");
            }
        }
    }
}

impl<B> Drop for SessionLifecycle<B> {
    fn drop(&mut self) {
        // unblocks a script still waiting for its session
        self.machine.clear_callbacks();

        let mailbox = self.machine.shared().with_slots(|slots| slots.mailbox.take());
        drop(mailbox);
    }
}

fn script_worker<S: Script>(machine: Machine, script: S) {
    let mut ctx = ScriptContext::new(machine.clone());

    let res = panic::catch_unwind(AssertUnwindSafe(|| script.run(&mut ctx)))
        .unwrap_or(Err(Error::ScriptPanicked));

    let res = match res {
        Ok(()) if ctx.sessions() == 0 => Err(Error::NoSession),
        res => res,
    };

    let to = if machine.state() == State::Imported {
        State::ExecFail
    } else {
        State::Init
    };

    if let Err(e) = machine.transition_with(to, move |slots| {
        slots.failure = res.err();
        Ok(())
    }) {
        tracing::error!(error = %e, "script worker couldn't complete the round");
    }
}
