//! Error handling for upstart job definitions.
use thiserror::Error;

/// Errors raised while building or rendering a job definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// A directive method received a value it cannot encode.
    #[error("Invalid value '{value}' for '{directive}': {reason}")]
    InvalidArgument {
        /// The directive keyword being written (e.g. `console`).
        directive: String,
        /// The offending value as received.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Rendering was attempted before `exec` or `script` was set.
    #[error("Job has no run directive; set exec/script before rendering")]
    IncompleteDocument,
}

impl JobError {
    /// Shorthand for building an [`JobError::InvalidArgument`].
    pub fn invalid(
        directive: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        JobError::InvalidArgument {
            directive: directive.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading a YAML job manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Error reading or accessing the manifest file.
    #[error("Failed to read manifest: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the YAML manifest.
    #[error("Invalid YAML format: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The manifest references an environment variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The manifest parsed but describes an invalid job.
    #[error("Invalid job: {0}")]
    Job(#[from] JobError),
}

/// Errors raised while placing job definitions into a job directory.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The job name cannot be used as a file name in the job directory.
    #[error("Invalid job name '{0}'")]
    InvalidJobName(String),

    /// Error writing or removing a job file.
    #[error("Failed to write job file: {0}")]
    Io(#[from] std::io::Error),

    /// The job to remove has no definition in the job directory.
    #[error("Job '{0}' is not installed")]
    NotInstalled(String),

    /// The job could not be rendered.
    #[error("Failed to render job: {0}")]
    Job(#[from] JobError),

    /// The manifest describing the job could not be loaded.
    #[error("Failed to load manifest: {0}")]
    Manifest(#[from] ManifestError),
}
