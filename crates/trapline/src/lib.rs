//! This crate allows to instrument a process with scripted breakpoints,
//! mockups and function-call interception.
//!
//! Three main components are provided:
//! - A [Session](self::session::Session), holding the handlers to run when
//!   the instrumented process (the *inferior*) reaches an address, a
//!   function, or triggers a lifecycle event.
//! - An [ExecutionController](self::controller::ExecutionController),
//!   launching the inferior and dispatching its events to the session, one
//!   iteration after the other.
//! - A [SessionLifecycle](self::lifecycle::SessionLifecycle), running
//!   scripts on a worker thread and serving the sessions they hand over.
//!
//! # Instrumenting a process
//!
//! Handlers are registered on a session, which a script runs until its
//! iteration limit is reached.
//!
//! ```no_run
//! use trapline::backend::Backend;
//! use trapline::lifecycle::{Outcome, ScriptContext, SessionLifecycle};
//! use trapline::session::{Event, HookOptions, Session};
//!
//! fn instrument<B: Backend>(backend: B) -> trapline::Result<Outcome> {
//!     let mut lifecycle = SessionLifecycle::new(backend).one_shot(true);
//!
//!     lifecycle.run_script(|ctx: &mut ScriptContext| -> trapline::Result<()> {
//!         let mut session = Session::new("./crackme").with_limit(3);
//!
//!         // bypass the license check, pretending it succeeded
//!         session.skip(
//!             "check_license",
//!             "check_license+0x40",
//!             HookOptions::new().regstate("rax", 1),
//!         )?;
//!
//!         session.on(Event::signal("SIGSEGV"), |host, _| {
//!             host.set_flag("crashed");
//!             Ok(())
//!         });
//!
//!         let session = ctx.run_session(session)?;
//!         assert!(session.finished());
//!
//!         Ok(())
//!     })
//! }
//! ```
//!
//! # Implementing a process-control backend
//!
//! The [Backend](self::backend::Backend)/[Process](self::backend::Process)
//! traits implement the low-level logic of launching and controlling the
//! inferior. For instance, a backend could rely on `ptrace`, on a remote
//! debugger stub, or on an emulator.

/// Module containing data layouts, value locations and calling conventions.
pub mod abi;

mod addr;

/// Module containing traits for implementing a process-control backend.
pub mod backend;

mod config;

/// Module implementing the execution controller.
pub mod controller;

mod error;

pub mod lifecycle;

/// Module containing sessions and their handlers.
pub mod session;

pub mod signal;

pub use self::addr::{Addr, IntoAddr};
pub use self::config::{ArgConfig, SessionConfig, StreamConfig};
pub use self::error::{BackendError, Error, Result};
pub use self::lifecycle::{Outcome, SessionLifecycle};
pub use self::session::{Event, HookOptions, Session};
