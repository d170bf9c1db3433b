//! Ordered stanza storage backing a job definition.
use std::{borrow::Cow, fmt};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{error::JobError, job::LimitResource};

/// Every directive keyword a job definition can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Directive {
    Description,
    Author,
    Version,
    Usage,
    StartOn,
    StopOn,
    Exec,
    Script,
    PreStart,
    PostStart,
    PreStop,
    PostStop,
    Emits,
    Env,
    Export,
    Respawn,
    RespawnLimit,
    KillTimeout,
    KillSignal,
    ReloadSignal,
    NormalExit,
    Console,
    Nice,
    OomScore,
    /// One `limit` line per resource.
    Limit(LimitResource),
    Chdir,
    Chroot,
    ApparmorLoad,
    ApparmorSwitch,
    Instance,
    Manual,
    Setgid,
    Setuid,
    Task,
    Umask,
    Expect,
}

impl Directive {
    /// Keyword written at the start of the directive's line(s).
    pub fn keyword(&self) -> Cow<'static, str> {
        let keyword = match self {
            Directive::Description => "description",
            Directive::Author => "author",
            Directive::Version => "version",
            Directive::Usage => "usage",
            Directive::StartOn => "start on",
            Directive::StopOn => "stop on",
            Directive::Exec => "exec",
            Directive::Script => "script",
            Directive::PreStart => "pre-start",
            Directive::PostStart => "post-start",
            Directive::PreStop => "pre-stop",
            Directive::PostStop => "post-stop",
            Directive::Emits => "emits",
            Directive::Env => "env",
            Directive::Export => "export",
            Directive::Respawn => "respawn",
            Directive::RespawnLimit => "respawn limit",
            Directive::KillTimeout => "kill timeout",
            Directive::KillSignal => "kill signal",
            Directive::ReloadSignal => "reload signal",
            Directive::NormalExit => "normal exit",
            Directive::Console => "console",
            Directive::Nice => "nice",
            Directive::OomScore => "oom score",
            Directive::Limit(resource) => {
                return Cow::Owned(format!("limit {}", resource.as_ref()));
            }
            Directive::Chdir => "chdir",
            Directive::Chroot => "chroot",
            Directive::ApparmorLoad => "apparmor load",
            Directive::ApparmorSwitch => "apparmor switch",
            Directive::Instance => "instance",
            Directive::Manual => "manual",
            Directive::Setgid => "setgid",
            Directive::Setuid => "setuid",
            Directive::Task => "task",
            Directive::Umask => "umask",
            Directive::Expect => "expect",
        };
        Cow::Borrowed(keyword)
    }

    /// Whether the directive may legitimately appear on several lines.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Directive::Env | Directive::Emits | Directive::Export)
    }

    /// Whether the directive makes the job runnable.
    pub fn is_run_directive(&self) -> bool {
        matches!(self, Directive::Exec | Directive::Script)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keyword())
    }
}

/// Insertion-ordered directive storage.
///
/// Keys keep the position of their first insertion; that order becomes the line order
/// of the rendered job file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StanzaDocument {
    stanzas: IndexMap<Directive, Vec<String>>,
}

impl StanzaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every value held for `directive` with `value`.
    pub fn set(&mut self, directive: Directive, value: impl Into<String>) {
        let value = value.into();
        debug!("Setting stanza '{directive}' to {value:?}");
        if let Some(values) = self.stanzas.get_mut(&directive) {
            if directive.is_multi_valued() && values.len() > 1 {
                warn!(
                    "Replacing {} existing '{directive}' values with a single value",
                    values.len()
                );
            }
            *values = vec![value];
        } else {
            self.stanzas.insert(directive, vec![value]);
        }
    }

    /// Appends `value` to the values of a multi-valued directive.
    ///
    /// Single-valued directives cannot accumulate lines, so for them this behaves like
    /// [`StanzaDocument::set`].
    pub fn add(&mut self, directive: Directive, value: impl Into<String>) {
        if !directive.is_multi_valued() {
            warn!("'{directive}' holds a single value; replacing instead of appending");
            self.set(directive, value);
            return;
        }

        let value = value.into();
        debug!("Adding stanza '{directive}' value {value:?}");
        self.stanzas.entry(directive).or_default().push(value);
    }

    /// Values currently held for `directive`, in insertion order.
    pub fn get(&self, directive: Directive) -> Option<&[String]> {
        self.stanzas.get(&directive).map(Vec::as_slice)
    }

    pub fn contains(&self, directive: Directive) -> bool {
        self.stanzas.contains_key(&directive)
    }

    /// Removes a directive, preserving the order of the remaining keys.
    pub fn remove(&mut self, directive: Directive) -> Option<Vec<String>> {
        self.stanzas.shift_remove(&directive)
    }

    /// Number of distinct directives.
    pub fn len(&self) -> usize {
        self.stanzas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Directive, &[String])> {
        self.stanzas
            .iter()
            .map(|(directive, values)| (directive, values.as_slice()))
    }

    /// Fails unless a run directive (`exec` or `script`) is present.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.stanzas.keys().any(Directive::is_run_directive) {
            Ok(())
        } else {
            Err(JobError::IncompleteDocument)
        }
    }

    /// Serializes the document into job-file text.
    ///
    /// Each value becomes `"<keyword> <value>\n"`. Marker directives have no value and
    /// render as the bare keyword; block values begin with their own newline and are
    /// appended directly after the keyword.
    pub fn render(&self) -> Result<String, JobError> {
        self.validate()?;

        let mut out = String::new();
        for (directive, values) in &self.stanzas {
            let keyword = directive.keyword();
            for value in values {
                out.push_str(&keyword);
                if !value.is_empty() && !value.starts_with('\n') {
                    out.push(' ');
                }
                out.push_str(value);
                out.push('\n');
            }
        }

        Ok(out)
    }
}
