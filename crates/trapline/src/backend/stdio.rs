use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration of one standard stream of the inferior.
#[derive(Debug, Clone, Default)]
pub enum IoConfig {
    /// The backend decides, usually by inheriting the host's stream.
    #[default]
    Inherit,

    /// The stream is connected to an already opened file.
    File(Arc<File>),

    /// The stream is redirected to (or from) a path.
    Redirect(PathBuf),
}

impl IoConfig {
    /// Redirects a stream to (or from) the given path.
    pub fn redirect(path: impl Into<PathBuf>) -> Self {
        Self::Redirect(path.into())
    }

    /// Path the stream is redirected to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Redirect(path) => Some(path),
            Self::Inherit | Self::File(_) => None,
        }
    }

    /// Whether the stream is detached from the host's stream.
    pub const fn is_redirected(&self) -> bool {
        !matches!(self, Self::Inherit)
    }
}

/// Direction of a standard stream, as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    /// The host reads what the inferior writes.
    Read,

    /// The host writes what the inferior reads.
    Write,
}

/// Standard streams of the inferior.
#[derive(Debug, Clone, Default)]
pub struct Stdio {
    /// Standard input.
    pub stdin: IoConfig,

    /// Standard output.
    pub stdout: IoConfig,

    /// Standard error.
    pub stderr: IoConfig,
}

impl Stdio {
    /// Iterates over the streams with their name and direction.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, IoDirection, &IoConfig)> {
        [
            ("stdin", IoDirection::Write, &self.stdin),
            ("stdout", IoDirection::Read, &self.stdout),
            ("stderr", IoDirection::Read, &self.stderr),
        ]
        .into_iter()
    }
}
