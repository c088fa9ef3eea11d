use std::path::PathBuf;

use crate::lifecycle::State;

/// Error returned by a process-control backend.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct BackendError(pub Box<dyn std::error::Error + Send + Sync>);

impl BackendError {
    /// Wraps an arbitrary backend error.
    pub fn new(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(e.into())
    }
}

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid address specification, convention or configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A symbol couldn't be resolved in the inferior.
    #[error("Symbol {0} not found")]
    SymbolNotFound(String),

    /// A lifecycle transition was requested along an undeclared edge.
    #[error("Illegal lifecycle transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// State the machine was in.
        from: State,

        /// Requested state.
        to: State,
    },

    /// A lifecycle transition was requested from within a transition.
    #[error("Reentrant lifecycle transition")]
    ReentrantTransition,

    /// The process-control backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The inferior couldn't be launched.
    #[error("Failed to launch {0}")]
    Launch(PathBuf, #[source] BackendError),

    /// A breakpoint couldn't be installed.
    #[error("Failed to set breakpoint at {addr:#x}")]
    Breakpoint {
        /// Address of the breakpoint.
        addr: u64,

        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// No inferior is currently live.
    #[error("No live inferior")]
    NoProcess,

    /// The inferior was mutated outside of a deferred procedure.
    #[error("Inferior mutation outside of a stop context")]
    UnsafeMutation,

    /// A value's size doesn't match the size of its location.
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size of the location, in bytes.
        expected: usize,

        /// Size of the value, in bytes.
        actual: usize,
    },

    /// A bit width isn't one of 8, 16, 32 or 64.
    #[error("Unsupported size of {0} bits")]
    UnsupportedSize(u32),

    /// The calling convention can't locate an argument.
    #[error("No location for argument {ordinal} of the {category:?} category")]
    UnknownArgument {
        /// Argument category.
        category: crate::abi::ArgCategory,

        /// Argument ordinal (0 is the return value).
        ordinal: usize,
    },

    /// The saved return address on the stack is invalid.
    #[error("Invalid return address {0:#x}")]
    InvalidReturnAddress(u64),

    /// A script or a handler failed.
    #[error("Script error")]
    Script(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The script worker thread panicked.
    #[error("Script panicked")]
    ScriptPanicked,

    /// The script returned without running any session.
    #[error("Script produced no session")]
    NoSession,

    /// The other side of the lifecycle went away.
    #[error("Lifecycle peer disconnected")]
    Disconnected,

    /// I/O error, e.g., when spawning the script worker.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an error raised by a user script or handler.
    pub fn script(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Script(e.into())
    }
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
