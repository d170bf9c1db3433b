//! Embedded scripts for `script … end script` blocks.
use std::fmt;

use strum_macros::{AsRefStr, EnumString};

use crate::error::JobError;

/// Opening keyword of a script block.
const SCRIPT_OPEN: &str = "script\n";
/// Closing keyword of a script block.
const SCRIPT_CLOSE: &str = "end script\n";

/// Program that executes a script body.
#[derive(Clone, Debug, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Interpreter {
    /// Upstart's own shell, or an explicit shell binary fed through a here-document.
    Shell(Option<String>),
    Perl,
    Python,
}

impl Interpreter {
    /// Command used when a named interpreter has no override.
    fn default_command(&self) -> Option<&'static str> {
        match self {
            Interpreter::Shell(_) => None,
            Interpreter::Perl => Some("perl"),
            Interpreter::Python => Some("python"),
        }
    }
}

/// An interpreter script embedded in a job definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptBlock {
    body: String,
    interpreter: Interpreter,
    command: Option<String>,
}

impl ScriptBlock {
    /// Creates a block with a normalized body.
    ///
    /// Leading whitespace is dropped and a trailing newline is guaranteed, so a
    /// here-document terminator always lands on its own line.
    pub fn new(body: &str, interpreter: Interpreter) -> Result<Self, JobError> {
        let trimmed = body.trim_start();
        if trimmed.is_empty() {
            return Err(JobError::invalid("script", body, "script body is empty"));
        }

        let mut body = trimmed.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }

        Ok(Self {
            body,
            interpreter,
            command: None,
        })
    }

    /// Script run by Upstart's default shell.
    pub fn shell(body: &str) -> Result<Self, JobError> {
        Self::new(body, Interpreter::Shell(None))
    }

    /// Script fed to `interpreter` (e.g. `/bin/bash`) through a here-document.
    pub fn shell_with(body: &str, interpreter: impl Into<String>) -> Result<Self, JobError> {
        Self::new(body, Interpreter::Shell(Some(interpreter.into())))
    }

    pub fn perl(body: &str) -> Result<Self, JobError> {
        Self::new(body, Interpreter::Perl)
    }

    pub fn python(body: &str) -> Result<Self, JobError> {
        Self::new(body, Interpreter::Python)
    }

    /// Overrides the command that invokes a named interpreter (e.g. `python3`).
    ///
    /// For shell scripts this selects the interpreter path.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        if matches!(self.interpreter, Interpreter::Shell(_)) {
            self.interpreter = Interpreter::Shell(Some(command.into()));
        } else {
            self.command = Some(command.into());
        }
        self
    }

    /// The normalized body.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Program line that opens the here-document, if any.
    pub fn invocation(&self) -> Option<&str> {
        match &self.interpreter {
            Interpreter::Shell(path) => path.as_deref(),
            named => self.command.as_deref().or_else(|| named.default_command()),
        }
    }

    /// Renders the block, optionally preceded by the opening `script` keyword.
    ///
    /// The closing `end script` line is always included.
    pub fn render(&self, with_wrapper: bool) -> String {
        let mut out = String::new();
        if with_wrapper {
            out.push_str(SCRIPT_OPEN);
        }

        match &self.interpreter {
            Interpreter::Shell(None) => out.push_str(&self.body),
            Interpreter::Shell(Some(path)) => {
                out.push_str(&format!("{path} <<EOT\n{}EOT\n", self.body));
            }
            _ => {
                let command = self.invocation().unwrap_or_default();
                out.push_str(&format!("{command} - <<END\n{}END\n", self.body));
            }
        }

        out.push_str(SCRIPT_CLOSE);
        out
    }
}

impl fmt::Display for ScriptBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}
