use std::fmt;

/// Lifecycle event a handler can be registered against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    /// The inferior reached its entry point.
    Entry,

    /// The inferior started (or resumed) executing.
    Start,

    /// The inferior exited.
    Exit,

    /// The inferior was just created, before it starts executing.
    ///
    /// Fired once per iteration.
    InferiorPre,

    /// The inferior is about to be destroyed, after cleanup.
    ///
    /// Fired once per iteration.
    InferiorPost,

    /// The inferior executed one instruction in step mode.
    Step,

    /// An iteration is about to launch the inferior (which doesn't exist
    /// yet).
    Run,

    /// The session is finished and about to be handed back to the script.
    Finish,

    /// The inferior stopped on the named signal (e.g., `SIGSEGV`).
    Signal(String),

    /// The inferior stopped on a signal no handler was registered for.
    ///
    /// Handlers receive an [Event::Signal] naming the signal.
    SignalDefault,

    /// The inferior stopped on a signal the host platform doesn't know.
    SignalUnknown,
}

impl Event {
    /// Creates a signal event.
    pub fn signal(name: impl Into<String>) -> Self {
        Self::Signal(name.into())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Start => f.write_str("start"),
            Self::Exit => f.write_str("exit"),
            Self::InferiorPre => f.write_str("inferior-pre"),
            Self::InferiorPost => f.write_str("inferior-post"),
            Self::Step => f.write_str("step"),
            Self::Run => f.write_str("run"),
            Self::Finish => f.write_str("finish"),
            Self::Signal(name) => f.write_str(name),
            Self::SignalDefault => f.write_str("signal-default"),
            Self::SignalUnknown => f.write_str("signal-unknown"),
        }
    }
}
