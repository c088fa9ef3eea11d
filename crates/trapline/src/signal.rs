//! Recognition of platform signal names.

/// Returns whether `name` (e.g., `SIGSEGV`) is a signal known to the host
/// platform.
#[cfg(unix)]
pub fn is_known(name: &str) -> bool {
    use std::str::FromStr;

    nix::sys::signal::Signal::from_str(name).is_ok()
}

/// Returns whether `name` (e.g., `SIGSEGV`) is a signal known to the host
/// platform.
#[cfg(not(unix))]
pub fn is_known(name: &str) -> bool {
    const SIGNALS: &[&str] = &[
        "SIGABRT", "SIGFPE", "SIGILL", "SIGINT", "SIGSEGV", "SIGTERM", "SIGTRAP",
    ];

    SIGNALS.contains(&name)
}
