use std::ffi::OsStr;
use std::path::Path;

use miette::IntoDiagnostic;

use crate::abi::{ConventionKind, Endian, StackGrowth};
use crate::backend::{IoConfig, LaunchCommand};
use crate::error::Result;
use crate::session::Session;

/// Configuration of a session, decoded from KDL.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct SessionConfig {
    /// Program to launch.
    #[knus(child, unwrap(argument))]
    pub target: String,

    /// Program arguments.
    #[knus(children(name = "arg"))]
    pub args: Vec<ArgConfig>,

    /// Iteration limit (0 means unlimited).
    #[knus(child, default = 1, unwrap(argument))]
    pub limit: u64,

    /// Byte order of the inferior.
    #[knus(child, default, unwrap(argument))]
    pub endian: Endian,

    /// Stack growth direction of the inferior.
    #[knus(child, default, unwrap(argument))]
    pub stack: StackGrowth,

    /// Calling convention of function hooks.
    #[knus(child, unwrap(argument))]
    pub convention: Option<ConventionKind>,

    /// Standard input redirection.
    #[knus(child)]
    pub stdin: Option<StreamConfig>,

    /// Standard output redirection.
    #[knus(child)]
    pub stdout: Option<StreamConfig>,

    /// Standard error redirection.
    #[knus(child)]
    pub stderr: Option<StreamConfig>,
}

/// Program argument.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ArgConfig {
    /// Argument value.
    #[knus(argument)]
    pub value: String,
}

/// Redirection of a standard stream.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct StreamConfig {
    /// Path the stream is redirected to (or from).
    #[knus(property)]
    pub path: String,
}

impl SessionConfig {
    /// Parses a session configuration. `name` is the file name reported in
    /// diagnostics.
    pub fn from_kdl(name: &str, text: &str) -> core::result::Result<Self, knus::Error> {
        knus::parse(name, text)
    }

    /// Reads and parses a session configuration file.
    pub fn from_file(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).into_diagnostic()?;

        let name = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("<content>");

        Ok(Self::from_kdl(name, &content)?)
    }
}

impl Session {
    /// Creates a session from its configuration.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let redirect = |stream: &Option<StreamConfig>| {
            stream
                .as_ref()
                .map_or(IoConfig::Inherit, |s| IoConfig::redirect(&s.path))
        };

        let command = LaunchCommand::new(&config.target)
            .args(config.args.iter().map(|arg| arg.value.as_str()))
            .stdin(redirect(&config.stdin))
            .stdout(redirect(&config.stdout))
            .stderr(redirect(&config.stderr));

        let mut session = Self::with_command(command).with_limit(config.limit);

        session.set_endian(config.endian);
        session.set_stack_growth(config.stack);

        if let Some(kind) = config.convention {
            session.use_convention(kind)?;
        }

        Ok(session)
    }
}
