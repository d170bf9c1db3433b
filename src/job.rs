//! Fluent builder for Upstart job definitions.
use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{
    error::JobError,
    event::{EventExpr, Runlevels},
    script::ScriptBlock,
    stanza::{Directive, StanzaDocument},
};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

static SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]+|(?:SIG)?[A-Z][A-Z0-9+-]*)$").expect("signal pattern is valid")
});

/// Backslash-escapes backslashes and both quote characters.
pub fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
}

/// Escapes `value` and wraps it in double quotes.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

/// Fails unless `value` is a shell variable name.
pub(crate) fn validate_identifier(directive: &str, value: &str) -> Result<(), JobError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(JobError::invalid(
            directive,
            value,
            "expected a variable name ([A-Za-z_][A-Za-z0-9_]*)",
        ))
    }
}

/// Fails if `value` would spill onto a second line of the job file.
pub(crate) fn validate_single_line(directive: &str, value: &str) -> Result<(), JobError> {
    if value.contains(['\n', '\r']) {
        Err(JobError::invalid(
            directive,
            value,
            "value must fit on a single line",
        ))
    } else {
        Ok(())
    }
}

fn validate_signal(directive: &str, value: &str) -> Result<(), JobError> {
    if SIGNAL.is_match(value) {
        Ok(())
    } else {
        Err(JobError::invalid(
            directive,
            value,
            "expected a signal name (e.g. TERM, SIGHUP) or number",
        ))
    }
}

/// Where a job's standard output and error are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConsoleTarget {
    Log,
    Output,
    Owner,
    #[strum(serialize = "none")]
    Disabled,
}

/// How many times the main process is expected to fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ExpectType {
    Fork,
    Daemon,
    Stop,
}

/// Resources accepted by the `limit` directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LimitResource {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Memlock,
    Msgqueue,
    Nice,
    Nofile,
    Nproc,
    Rss,
    Rtprio,
    Sigpending,
    Stack,
}

/// Soft or hard bound of a resource limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitValue {
    Unlimited,
    Value(u64),
}

impl fmt::Display for LimitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitValue::Unlimited => f.write_str("unlimited"),
            LimitValue::Value(value) => write!(f, "{value}"),
        }
    }
}

impl FromStr for LimitValue {
    type Err = JobError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed == "unlimited" {
            return Ok(LimitValue::Unlimited);
        }

        trimmed.parse::<u64>().map(LimitValue::Value).map_err(|_| {
            JobError::invalid("limit", value, "expected a number or 'unlimited'")
        })
    }
}

impl From<u64> for LimitValue {
    fn from(value: u64) -> Self {
        LimitValue::Value(value)
    }
}

/// What a job runs: a command line for `exec`, or an embedded script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunInput {
    PlainCommand(String),
    Script(ScriptBlock),
}

impl From<&str> for RunInput {
    fn from(command: &str) -> Self {
        RunInput::PlainCommand(command.to_string())
    }
}

impl From<String> for RunInput {
    fn from(command: String) -> Self {
        RunInput::PlainCommand(command)
    }
}

impl From<ScriptBlock> for RunInput {
    fn from(script: ScriptBlock) -> Self {
        RunInput::Script(script)
    }
}

/// Builds an Upstart job definition one directive at a time.
///
/// Setters that take no free text return `&mut Self` for chaining. Setters that
/// validate (including every free-text value, which must stay on one line) return
/// a `Result` and leave the job untouched when they fail.
///
/// ```
/// use upstart::job::JobBuilder;
///
/// # fn main() -> Result<(), upstart::JobError> {
/// let mut job = JobBuilder::new();
/// job.description("Test description")?
///     .author("Dustin Oprea")?
///     .run("my_daemon")?;
///
/// assert_eq!(
///     job.render()?,
///     "description \"Test description\"\nauthor \"Dustin Oprea\"\nexec my_daemon\n"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobBuilder {
    stanzas: StanzaDocument,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying stanza storage.
    pub fn document(&self) -> &StanzaDocument {
        &self.stanzas
    }

    /// Renders the job file text.
    pub fn render(&self) -> Result<String, JobError> {
        self.stanzas.render()
    }

    fn set(&mut self, directive: Directive, value: impl Into<String>) -> &mut Self {
        self.stanzas.set(directive, value);
        self
    }

    fn add(&mut self, directive: Directive, value: impl Into<String>) -> &mut Self {
        self.stanzas.add(directive, value);
        self
    }

    /// Sets the main process: `exec <command>` or a `script … end script` block.
    ///
    /// A job has one main process, so this replaces whichever form was set before.
    /// A plain command must fit on one line.
    pub fn run(&mut self, command: impl Into<RunInput>) -> Result<&mut Self, JobError> {
        match command.into() {
            RunInput::PlainCommand(command) => {
                validate_single_line("exec", &command)?;
                self.stanzas.remove(Directive::Script);
                Ok(self.set(Directive::Exec, command))
            }
            RunInput::Script(script) => {
                let value = block_value("script", &script, false)?;
                self.stanzas.remove(Directive::Exec);
                Ok(self.set(Directive::Script, format!("\n{value}")))
            }
        }
    }

    fn hook(&mut self, directive: Directive, command: RunInput) -> Result<&mut Self, JobError> {
        let value = match command {
            RunInput::PlainCommand(command) => {
                validate_single_line(&directive.keyword(), &command)?;
                format!("exec {command}")
            }
            RunInput::Script(script) => block_value(&directive.keyword(), &script, true)?,
        };
        Ok(self.set(directive, value))
    }

    pub fn pre_start(&mut self, command: impl Into<RunInput>) -> Result<&mut Self, JobError> {
        self.hook(Directive::PreStart, command.into())
    }

    pub fn post_start(&mut self, command: impl Into<RunInput>) -> Result<&mut Self, JobError> {
        self.hook(Directive::PostStart, command.into())
    }

    pub fn pre_stop(&mut self, command: impl Into<RunInput>) -> Result<&mut Self, JobError> {
        self.hook(Directive::PreStop, command.into())
    }

    pub fn post_stop(&mut self, command: impl Into<RunInput>) -> Result<&mut Self, JobError> {
        self.hook(Directive::PostStop, command.into())
    }

    /// Sets a single-line value after checking it.
    fn set_line(&mut self, directive: Directive, value: &str) -> Result<&mut Self, JobError> {
        validate_single_line(&directive.keyword(), value)?;
        Ok(self.set(directive, value))
    }

    /// Sets a quoted free-text value such as `description`.
    fn set_quoted(&mut self, directive: Directive, value: &str) -> Result<&mut Self, JobError> {
        validate_single_line(&directive.keyword(), value)?;
        Ok(self.set(directive, quote(value)))
    }

    /// Events that start the job.
    pub fn start_on(&mut self, events: impl Into<EventExpr>) -> Result<&mut Self, JobError> {
        let rendered = events.into().render("start on")?;
        Ok(self.set(Directive::StartOn, rendered))
    }

    /// Starts the job on entering runlevels 2-5.
    pub fn start_on_runlevel(&mut self) -> &mut Self {
        self.set(
            Directive::StartOn,
            format!("runlevel [{}]", Runlevels::DEFAULT_START),
        )
    }

    pub fn start_on_runlevels(&mut self, runlevels: &Runlevels) -> &mut Self {
        self.set(Directive::StartOn, runlevels.render())
    }

    /// Starts the job just before `service` starts.
    pub fn start_on_before_started(&mut self, service: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::StartOn, &format!("starting {service}"))
    }

    /// Starts the job once `service` is running.
    pub fn start_on_after_started(&mut self, service: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::StartOn, &format!("started {service}"))
    }

    /// Events that stop the job.
    pub fn stop_on(&mut self, events: impl Into<EventExpr>) -> Result<&mut Self, JobError> {
        let rendered = events.into().render("stop on")?;
        Ok(self.set(Directive::StopOn, rendered))
    }

    /// Stops the job when leaving runlevels 2-5.
    pub fn stop_on_runlevel(&mut self) -> &mut Self {
        self.set(
            Directive::StopOn,
            format!("runlevel [{}]", Runlevels::DEFAULT_STOP),
        )
    }

    pub fn stop_on_runlevels(&mut self, runlevels: &Runlevels) -> &mut Self {
        self.set(Directive::StopOn, runlevels.render())
    }

    /// Stops the job as soon as `service` begins stopping.
    pub fn stop_on_before_stopped(&mut self, service: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::StopOn, &format!("stopping {service}"))
    }

    /// Stops the job once `service` has stopped.
    pub fn stop_on_after_stopped(&mut self, service: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::StopOn, &format!("stopped {service}"))
    }

    pub fn description(&mut self, description: &str) -> Result<&mut Self, JobError> {
        self.set_quoted(Directive::Description, description)
    }

    pub fn author(&mut self, author: &str) -> Result<&mut Self, JobError> {
        self.set_quoted(Directive::Author, author)
    }

    pub fn version(&mut self, version: &str) -> Result<&mut Self, JobError> {
        self.set_quoted(Directive::Version, version)
    }

    pub fn usage(&mut self, usage: &str) -> Result<&mut Self, JobError> {
        self.set_quoted(Directive::Usage, usage)
    }

    /// Declares one event the job emits. Each call adds an `emits` line.
    pub fn emits(&mut self, event: &str) -> Result<&mut Self, JobError> {
        validate_single_line("emits", event)?;
        Ok(self.add(Directive::Emits, event))
    }

    /// Declares several events on a single space-separated `emits` line.
    pub fn emits_all<S: AsRef<str>>(&mut self, events: &[S]) -> Result<&mut Self, JobError> {
        if events.is_empty() {
            return Err(JobError::invalid("emits", "", "no events given"));
        }
        for event in events {
            validate_single_line("emits", event.as_ref())?;
        }

        let joined = events
            .iter()
            .map(|event| event.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(self.add(Directive::Emits, joined))
    }

    /// Adds `env key=value`.
    pub fn env(&mut self, key: &str, value: &str) -> Result<&mut Self, JobError> {
        validate_identifier("env", key)?;
        validate_single_line("env", value)?;
        Ok(self.add(Directive::Env, format!("{key}={value}")))
    }

    /// Adds one `env` line per pair; nothing is added if any pair is invalid.
    pub fn env_all<K, V>(
        &mut self,
        vars: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Self, JobError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: Vec<(K, V)> = vars.into_iter().collect();
        for (key, value) in &vars {
            validate_identifier("env", key.as_ref())?;
            validate_single_line("env", value.as_ref())?;
        }

        for (key, value) in &vars {
            self.add(
                Directive::Env,
                format!("{}={}", key.as_ref(), value.as_ref()),
            );
        }
        Ok(self)
    }

    /// Exports a variable into the environment of emitted events.
    pub fn export(&mut self, name: &str) -> Result<&mut Self, JobError> {
        validate_identifier("export", name)?;
        Ok(self.add(Directive::Export, name))
    }

    pub fn respawn(&mut self) -> &mut Self {
        self.set(Directive::Respawn, "")
    }

    /// Gives up respawning after `count` restarts within `window_secs` seconds.
    pub fn respawn_limit(&mut self, count: u32, window_secs: u32) -> &mut Self {
        self.set(Directive::RespawnLimit, format!("{count} {window_secs}"))
    }

    /// Respawns without any rate limit.
    pub fn respawn_unlimited(&mut self) -> &mut Self {
        self.set(Directive::RespawnLimit, "unlimited")
    }

    pub fn kill_timeout(&mut self, secs: u32) -> &mut Self {
        self.set(Directive::KillTimeout, secs.to_string())
    }

    pub fn kill_signal(&mut self, signal: &str) -> Result<&mut Self, JobError> {
        validate_signal("kill signal", signal)?;
        Ok(self.set(Directive::KillSignal, signal))
    }

    pub fn reload_signal(&mut self, signal: &str) -> Result<&mut Self, JobError> {
        validate_signal("reload signal", signal)?;
        Ok(self.set(Directive::ReloadSignal, signal))
    }

    /// Exit codes and signals that count as a normal exit.
    pub fn normal_exit<S: AsRef<str>>(
        &mut self,
        codes: &[i32],
        signals: &[S],
    ) -> Result<&mut Self, JobError> {
        if codes.is_empty() && signals.is_empty() {
            return Err(JobError::invalid(
                "normal exit",
                "",
                "at least one exit code or signal is required",
            ));
        }

        for signal in signals {
            validate_signal("normal exit", signal.as_ref())?;
        }

        let parts: Vec<String> = codes
            .iter()
            .map(|code| code.to_string())
            .chain(signals.iter().map(|signal| signal.as_ref().to_string()))
            .collect();
        Ok(self.set(Directive::NormalExit, parts.join(" ")))
    }

    /// Sets the console from a target name; `None` disables console output.
    pub fn console(&mut self, target: Option<&str>) -> Result<&mut Self, JobError> {
        let target = match target {
            None => ConsoleTarget::Disabled,
            Some(name) => ConsoleTarget::from_str(name).map_err(|_| {
                JobError::invalid("console", name, "expected one of log, output, owner, none")
            })?,
        };
        Ok(self.console_target(target))
    }

    pub fn console_target(&mut self, target: ConsoleTarget) -> &mut Self {
        self.set(Directive::Console, target.as_ref())
    }

    /// Scheduling priority, from -20 (highest) to 19.
    pub fn nice(&mut self, priority: i32) -> Result<&mut Self, JobError> {
        if !(-20..=19).contains(&priority) {
            return Err(JobError::invalid(
                "nice",
                priority.to_string(),
                "expected a value between -20 and 19",
            ));
        }
        Ok(self.set(Directive::Nice, priority.to_string()))
    }

    /// OOM killer adjustment, from -999 to 1000.
    pub fn oom_score(&mut self, score: i32) -> Result<&mut Self, JobError> {
        if !(-999..=1000).contains(&score) {
            return Err(JobError::invalid(
                "oom score",
                score.to_string(),
                "expected a value between -999 and 1000",
            ));
        }
        Ok(self.set(Directive::OomScore, score.to_string()))
    }

    /// Exempts the job from the OOM killer.
    pub fn oom_never(&mut self) -> &mut Self {
        self.set(Directive::OomScore, "never")
    }

    /// Sets a resource limit by resource name (e.g. `nofile`).
    pub fn limit(
        &mut self,
        resource: &str,
        soft: LimitValue,
        hard: LimitValue,
    ) -> Result<&mut Self, JobError> {
        let resource = LimitResource::from_str(resource)
            .map_err(|_| JobError::invalid("limit", resource, "unknown resource"))?;
        self.limit_resource(resource, soft, hard)
    }

    /// Sets the limit for `resource`; a later call for the same resource replaces it.
    pub fn limit_resource(
        &mut self,
        resource: LimitResource,
        soft: LimitValue,
        hard: LimitValue,
    ) -> Result<&mut Self, JobError> {
        let exceeds = match (soft, hard) {
            (LimitValue::Value(soft), LimitValue::Value(hard)) => soft > hard,
            (LimitValue::Unlimited, LimitValue::Value(_)) => true,
            (_, LimitValue::Unlimited) => false,
        };
        if exceeds {
            return Err(JobError::invalid(
                format!("limit {resource}"),
                format!("{soft} {hard}"),
                "soft limit exceeds hard limit",
            ));
        }

        Ok(self.set(Directive::Limit(resource), format!("{soft} {hard}")))
    }

    pub fn chdir(&mut self, path: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::Chdir, path)
    }

    pub fn chroot(&mut self, path: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::Chroot, path)
    }

    pub fn apparmor_load(&mut self, profile_path: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::ApparmorLoad, profile_path)
    }

    pub fn apparmor_switch(&mut self, profile: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::ApparmorSwitch, profile)
    }

    /// Allows one instance per distinct value of the variable `var_name`.
    pub fn instance(&mut self, var_name: &str) -> Result<&mut Self, JobError> {
        validate_identifier("instance", var_name)?;
        Ok(self.set(Directive::Instance, format!("${var_name}")))
    }

    /// Ignores `start on` / `stop on`; the job only starts when asked to.
    pub fn manual(&mut self) -> &mut Self {
        self.set(Directive::Manual, "")
    }

    pub fn setgid(&mut self, group: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::Setgid, group)
    }

    pub fn setuid(&mut self, user: &str) -> Result<&mut Self, JobError> {
        self.set_line(Directive::Setuid, user)
    }

    /// Marks the job as a task that runs to completion.
    pub fn task(&mut self) -> &mut Self {
        self.set(Directive::Task, "")
    }

    /// File creation mask, written in octal (e.g. `0o022` renders as `022`).
    pub fn umask(&mut self, mode: u32) -> Result<&mut Self, JobError> {
        if mode > 0o777 {
            return Err(JobError::invalid(
                "umask",
                format!("{mode:o}"),
                "expected an octal mode no greater than 777",
            ));
        }
        Ok(self.set(Directive::Umask, format!("{mode:03o}")))
    }

    /// Sets the expected fork behavior from its name.
    pub fn expect(&mut self, kind: &str) -> Result<&mut Self, JobError> {
        let kind = ExpectType::from_str(kind).map_err(|_| {
            JobError::invalid("expect", kind, "expected one of fork, daemon, stop")
        })?;
        Ok(self.expect_type(kind))
    }

    pub fn expect_type(&mut self, kind: ExpectType) -> &mut Self {
        self.set(Directive::Expect, kind.as_ref())
    }
}

/// Script text stored as one stanza value; the document supplies the final newline.
fn block_value(
    directive: &str,
    script: &ScriptBlock,
    with_wrapper: bool,
) -> Result<String, JobError> {
    if let Some(invocation) = script.invocation() {
        validate_single_line(directive, invocation)?;
    }

    let mut rendered = script.render(with_wrapper);
    if rendered.ends_with('\n') {
        rendered.pop();
    }
    Ok(rendered)
}
