use std::collections::VecDeque;

use crate::backend::ResumeMode;
use crate::error::Result;
use crate::session::Host;

/// Procedure mutating the inferior, run once it is stopped.
pub(crate) type Deferred = Box<dyn FnOnce(&mut Host<'_>) -> Result<()>>;

/// Execution state shared between the controller and the handlers.
#[derive(Default)]
pub(crate) struct Control {
    /// Procedures to run at the next stop, in FIFO order.
    pub deferred: VecDeque<Deferred>,

    /// Whether the run should be suspended at the next stop.
    pub drop_into_cli: bool,

    pub step_mode: StepMode,
}

impl Control {
    pub fn reset(&mut self) {
        self.deferred.clear();
        self.drop_into_cli = false;
        self.step_mode = StepMode::Off;
    }
}

/// How the inferior advances between two stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// Runs until the next breakpoint, signal or exit.
    #[default]
    Off,

    /// Single-steps, entering calls.
    Into,

    /// Single-steps, stepping over calls.
    Over,
}

impl StepMode {
    pub(crate) const fn resume_mode(self) -> ResumeMode {
        match self {
            Self::Off => ResumeMode::Continue,
            Self::Into => ResumeMode::StepInto,
            Self::Over => ResumeMode::StepOver,
        }
    }

    /// Whether the inferior is being single-stepped.
    pub const fn is_stepping(self) -> bool {
        !matches!(self, Self::Off)
    }
}
