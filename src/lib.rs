//! Upstart is a library for describing init jobs in code. It builds job definitions
//! directive by directive, validates them, renders them in Upstart's job-file grammar
//! (including embedded `script … end script` blocks), installs them into a job
//! directory, and defines the control surface used to drive jobs on a running
//! Upstart instance.

/// Configuration management (YAML job manifests).
pub mod config;

/// Job control interfaces.
pub mod control;

/// Error handling.
pub mod error;

/// Event expressions for start/stop triggers.
pub mod event;

/// Job definition installation.
pub mod install;

/// Job definition builder.
pub mod job;

/// Logging setup.
pub mod logging;

/// Embedded scripts.
pub mod script;

/// Ordered stanza storage.
pub mod stanza;

#[doc(hidden)]
pub mod test_utils;

pub use error::JobError;
pub use event::{Conjunct, Event, EventExpr, Runlevels};
pub use job::{JobBuilder, RunInput};
pub use script::ScriptBlock;
