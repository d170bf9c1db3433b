//! Interfaces for controlling jobs on a running Upstart instance.
//!
//! The transport (D-Bus on a stock system) lives with the implementor; this module
//! defines the operations and the naming rules they share.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

/// Bus name owned by the Upstart daemon.
pub const UPSTART_SERVICE: &str = "com.ubuntu.Upstart";
/// Object path of the Upstart manager.
pub const UPSTART_PATH: &str = "/com/ubuntu/Upstart";
/// Prefix of every job object path.
pub const JOBS_PATH: &str = "/com/ubuntu/Upstart/jobs";
/// Manager interface.
pub const UPSTART_INTERFACE: &str = "com.ubuntu.Upstart0_6";
/// Job interface.
pub const JOB_INTERFACE: &str = "com.ubuntu.Upstart0_6.Job";

/// Errors raised by control implementations.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("expected a simple job name, got '{0}'")]
    InvalidJobName(String),
    #[error("unknown job '{0}'")]
    UnknownJob(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("supervisor rejected request: {0}")]
    Rejected(String),
}

/// Daemon log priority, from most to least verbose.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogPriority {
    Debug,
    Info,
    Message,
    Warn,
    Error,
    Fatal,
}

/// Properties reported for a job instance (e.g. `name`, `goal`, `state`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub properties: IndexMap<String, Value>,
}

impl JobStatus {
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// Desired state, e.g. `start` or `stop`.
    pub fn goal(&self) -> Option<&str> {
        self.get("goal").and_then(Value::as_str)
    }

    /// Current state, e.g. `running` or `waiting`.
    pub fn state(&self) -> Option<&str> {
        self.get("state").and_then(Value::as_str)
    }
}

/// A start or stop condition as reported by Upstart: a list of operator/event terms,
/// each a list of strings.
pub type Condition = Vec<Vec<String>>;

/// Operations on one named job.
pub trait JobControl {
    /// Name of the controlled job.
    fn name(&self) -> &str;

    /// Starts the job and waits for it to reach its goal.
    fn start(&self) -> Result<(), ControlError>;

    fn stop(&self) -> Result<(), ControlError>;

    fn restart(&self) -> Result<(), ControlError>;

    /// Properties of the job's default instance.
    fn status(&self) -> Result<JobStatus, ControlError>;

    fn start_condition(&self) -> Result<Condition, ControlError>;

    fn stop_condition(&self) -> Result<Condition, ControlError>;
}

/// Operations on the Upstart daemon itself.
pub trait SystemControl {
    fn version(&self) -> Result<String, ControlError>;

    fn log_priority(&self) -> Result<LogPriority, ControlError>;

    fn set_log_priority(&self, priority: LogPriority) -> Result<(), ControlError>;

    /// Names of every known job.
    fn list_jobs(&self) -> Result<Vec<String>, ControlError>;

    fn emit(&self, request: &EmitRequest) -> Result<(), ControlError>;
}

/// An event to emit, with its environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitRequest {
    pub name: String,
    pub env: IndexMap<String, String>,
    /// Block until every job started or stopped by the event has settled.
    pub wait: bool,
}

impl EmitRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: IndexMap::new(),
            wait: true,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.env.insert(key.into(), value.to_string());
        self
    }

    /// Returns immediately instead of waiting for the event to be handled.
    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    /// Environment in the `KEY=VALUE` form the daemon expects.
    pub fn env_assignments(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}

/// Escapes one object path element: bytes outside `[A-Za-z0-9]` become `_xx`.
pub fn escape_path_element(element: &str) -> String {
    if element.is_empty() {
        return "_".to_string();
    }

    let mut escaped = String::with_capacity(element.len());
    for byte in element.bytes() {
        if byte.is_ascii_alphanumeric() {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{byte:02x}"));
        }
    }
    escaped
}

/// Object path of the job `name`.
pub fn job_object_path(name: &str) -> Result<String, ControlError> {
    if name.is_empty() || name.starts_with('/') {
        return Err(ControlError::InvalidJobName(name.to_string()));
    }
    Ok(format!("{JOBS_PATH}/{}", escape_path_element(name)))
}

/// Object path of the default (unnamed) instance of `name`.
pub fn default_instance_path(name: &str) -> Result<String, ControlError> {
    Ok(format!("{}/_", job_object_path(name)?))
}

/// Last element of an object path, as returned when listing jobs.
pub fn job_name_from_path(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resets the daemon's log priority to `previous` unless `restore` already did.
struct PriorityRestore<'a, S: SystemControl + ?Sized> {
    system: &'a S,
    previous: LogPriority,
    armed: bool,
}

impl<S: SystemControl + ?Sized> PriorityRestore<'_, S> {
    fn restore(mut self) -> Result<(), ControlError> {
        self.armed = false;
        self.system.set_log_priority(self.previous)?;
        debug!("Restored log priority {}", self.previous);
        Ok(())
    }
}

impl<S: SystemControl + ?Sized> Drop for PriorityRestore<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.system.set_log_priority(self.previous) {
            Ok(()) => debug!("Restored log priority {} after unwinding", self.previous),
            Err(e) => warn!("Failed to restore log priority {}: {e}", self.previous),
        }
    }
}

/// Runs `f` with the daemon's log priority temporarily set to `priority`.
///
/// The previous priority is restored when `f` returns or panics. A failed restore
/// after a normal return is reported as the error.
pub fn with_log_priority<S, T>(
    system: &S,
    priority: LogPriority,
    f: impl FnOnce(&S) -> T,
) -> Result<T, ControlError>
where
    S: SystemControl + ?Sized,
{
    let previous = system.log_priority()?;
    debug!("Switching log priority from {previous} to {priority}");
    system.set_log_priority(priority)?;
    let guard = PriorityRestore {
        system,
        previous,
        armed: true,
    };
    let output = f(system);
    guard.restore()?;
    Ok(output)
}
