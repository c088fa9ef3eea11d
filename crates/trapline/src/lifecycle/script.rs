use super::machine::{Edge, Machine, State};
use crate::error::{Error, Result};
use crate::session::Session;

/// Instrumentation script, run on a dedicated worker thread.
///
/// A script prepares sessions and hands them over to the event thread with
/// [ScriptContext::run_session].
pub trait Script: Send + 'static {
    /// Runs the script.
    fn run(self, ctx: &mut ScriptContext) -> Result<()>;
}

impl<F> Script for F
where
    F: FnOnce(&mut ScriptContext) -> Result<()> + Send + 'static,
{
    fn run(self, ctx: &mut ScriptContext) -> Result<()> {
        self(ctx)
    }
}

/// Context of a running script.
pub struct ScriptContext {
    machine: Machine,
    sessions: usize,
}

impl ScriptContext {
    pub(crate) const fn new(machine: Machine) -> Self {
        Self {
            machine,
            sessions: 0,
        }
    }

    /// Number of sessions run so far.
    pub const fn sessions(&self) -> usize {
        self.sessions
    }

    /// Hands `session` over to the event thread, and blocks until it is
    /// done iterating.
    ///
    /// On success, the finished session is returned. If a handler or the
    /// backend failed while the session was running, the error is returned
    /// instead.
    #[tracing::instrument(name = "Session", skip_all, fields(index = self.sessions))]
    pub fn run_session(&mut self, session: Session) -> Result<Session> {
        let waiter = self.machine.wait_for(Edge::To(State::Finished));

        self.machine.transition_with(State::Session, move |slots| {
            slots.mailbox = Some(session);
            Ok(())
        })?;

        self.sessions += 1;

        waiter.wait()?;

        let (session, failure) = self
            .machine
            .shared()
            .with_slots(|slots| (slots.mailbox.take(), slots.failure.take()));

        if let Some(e) = failure {
            return Err(e);
        }

        let session = session.ok_or(Error::Disconnected)?;
        tracing::debug!(iterations = session.iteration(), "session finished");

        Ok(session)
    }
}
