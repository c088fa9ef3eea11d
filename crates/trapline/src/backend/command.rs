use std::path::PathBuf;

use super::stdio::{IoConfig, Stdio};

/// Launch parameters of an inferior.
///
/// A session keeps one command for all of its iterations, so every
/// iteration launches the exact same target.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    /// Program to launch.
    pub program: PathBuf,

    /// Program arguments, without the program name.
    pub args: Vec<String>,

    /// Working directory of the inferior.
    pub current_dir: Option<PathBuf>,

    /// Standard streams of the inferior.
    pub stdio: Stdio,
}

impl LaunchCommand {
    /// Constructs a new `LaunchCommand` for the program at path `program`,
    /// with no arguments and inherited standard streams.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdio: Stdio::default(),
        }
    }

    /// Adds an argument to pass to the program.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the program.
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    /// Sets the working directory of the inferior.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Configures the standard input of the inferior.
    pub fn stdin(mut self, config: IoConfig) -> Self {
        self.stdio.stdin = config;
        self
    }

    /// Configures the standard output of the inferior.
    pub fn stdout(mut self, config: IoConfig) -> Self {
        self.stdio.stdout = config;
        self
    }

    /// Configures the standard error of the inferior.
    pub fn stderr(mut self, config: IoConfig) -> Self {
        self.stdio.stderr = config;
        self
    }
}
