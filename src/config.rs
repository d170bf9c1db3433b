//! YAML job manifests.
use std::{env, fmt, fs, path::Path, str::FromStr, sync::LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{JobError, ManifestError},
    event::{Conjunct, Event, EventExpr, Runlevels},
    job::{JobBuilder, LimitValue, RunInput},
    script::{Interpreter, ScriptBlock},
};

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(\$)?\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env pattern is valid")
});

/// A job definition described in YAML.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct JobManifest {
    /// Job name used when installing; defaults to the manifest's file stem.
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub usage: Option<String>,
    pub start_on: Option<TriggerConfig>,
    pub stop_on: Option<TriggerConfig>,
    /// Main process of the job.
    pub run: RunConfig,
    pub pre_start: Option<RunConfig>,
    pub post_start: Option<RunConfig>,
    pub pre_stop: Option<RunConfig>,
    pub post_stop: Option<RunConfig>,
    /// Emitted events; a nested list becomes one space-separated line.
    pub emits: Option<Vec<EmitsConfig>>,
    /// Job environment; scalar values are written as text.
    pub env: Option<IndexMap<String, EnvValue>>,
    pub export: Option<Vec<String>>,
    #[serde(default)]
    pub respawn: bool,
    pub respawn_limit: Option<RespawnLimitConfig>,
    pub kill_timeout: Option<u32>,
    pub kill_signal: Option<String>,
    pub reload_signal: Option<String>,
    pub normal_exit: Option<NormalExitConfig>,
    /// One of `log`, `output`, `owner`, `none`.
    pub console: Option<String>,
    pub nice: Option<i32>,
    pub oom_score: Option<OomScoreConfig>,
    /// Resource limits keyed by resource name.
    pub limits: Option<IndexMap<String, LimitConfig>>,
    pub chdir: Option<String>,
    pub chroot: Option<String>,
    pub apparmor_load: Option<String>,
    pub apparmor_switch: Option<String>,
    pub instance: Option<String>,
    #[serde(default)]
    pub manual: bool,
    pub setuid: Option<String>,
    pub setgid: Option<String>,
    #[serde(default)]
    pub task: bool,
    /// Octal file mode mask, quoted (e.g. `"022"`).
    pub umask: Option<String>,
    /// One of `fork`, `daemon`, `stop`.
    pub expect: Option<String>,
}

/// A plain command, or an embedded script.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RunConfig {
    Command(String),
    Script(ScriptConfig),
}

/// Embedded script settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    pub script: String,
    /// `shell` (default), `perl` or `python`.
    pub interpreter: Option<String>,
    /// Explicit shell binary for shell scripts.
    pub shell: Option<String>,
    /// Command overriding the named interpreter's default.
    pub command: Option<String>,
}

/// A scalar environment value.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum EnvValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Text(text) => f.write_str(text),
            EnvValue::Integer(value) => write!(f, "{value}"),
            EnvValue::Float(value) => write!(f, "{value}"),
            EnvValue::Boolean(value) => write!(f, "{value}"),
        }
    }
}

/// Trigger for `start on` / `stop on`.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum TriggerConfig {
    /// Expression used verbatim.
    Expression(String),
    /// A single-key mapping such as `{started: mysql}`.
    Condition(TriggerCondition),
    Events(EventsTrigger),
}

/// Shorthand triggers, each written as a mapping with exactly one key.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum TriggerCondition {
    Runlevel(String),
    Starting(String),
    Started(String),
    Stopping(String),
    Stopped(String),
}

/// Several events joined by `conjunct` (`and` when omitted).
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EventsTrigger {
    pub events: Vec<EventConfig>,
    pub conjunct: Option<Conjunct>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum EventConfig {
    Name(String),
    WithEnv(EventWithEnv),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EventWithEnv {
    pub name: String,
    #[serde(default)]
    pub env: IndexMap<String, EnvValue>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum EmitsConfig {
    Event(String),
    Group(Vec<String>),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RespawnLimitConfig {
    /// `unlimited`
    Keyword(String),
    Limit { count: u32, interval: u32 },
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NormalExitConfig {
    #[serde(default)]
    pub codes: Vec<i32>,
    #[serde(default)]
    pub signals: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OomScoreConfig {
    Score(i32),
    /// `never`
    Keyword(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitConfig {
    pub soft: LimitBound,
    pub hard: LimitBound,
}

/// A limit bound: a number, or `unlimited`.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum LimitBound {
    Number(u64),
    Word(String),
}

impl LimitBound {
    fn value(&self) -> Result<LimitValue, JobError> {
        match self {
            LimitBound::Number(value) => Ok(LimitValue::Value(*value)),
            LimitBound::Word(word) => LimitValue::from_str(word),
        }
    }
}

impl ScriptConfig {
    fn to_block(&self) -> Result<ScriptBlock, JobError> {
        let interpreter = match self.interpreter.as_deref() {
            None => Interpreter::Shell(None),
            Some(name) => Interpreter::from_str(name).map_err(|_| {
                JobError::invalid("script", name, "expected interpreter shell, perl or python")
            })?,
        };

        let block = match (interpreter, &self.shell) {
            (Interpreter::Shell(_), Some(shell)) => ScriptBlock::shell_with(&self.script, shell)?,
            (_, Some(shell)) => {
                return Err(JobError::invalid(
                    "script",
                    shell,
                    "'shell' only applies to shell scripts",
                ));
            }
            (interpreter, None) => ScriptBlock::new(&self.script, interpreter)?,
        };

        Ok(match &self.command {
            Some(command) => block.with_command(command),
            None => block,
        })
    }
}

impl RunConfig {
    fn to_input(&self) -> Result<RunInput, JobError> {
        match self {
            RunConfig::Command(command) => Ok(RunInput::PlainCommand(command.clone())),
            RunConfig::Script(script) => Ok(RunInput::Script(script.to_block()?)),
        }
    }
}

impl EventConfig {
    fn to_event(&self) -> Event {
        match self {
            EventConfig::Name(name) => Event::new(name),
            EventConfig::WithEnv(EventWithEnv { name, env }) => env
                .iter()
                .fold(Event::new(name), |event, (key, value)| {
                    event.with_env(key, value.to_string())
                }),
        }
    }
}

impl TriggerConfig {
    /// Converts the trigger into an event expression.
    pub fn to_expr(&self) -> Result<EventExpr, JobError> {
        let expr = match self {
            TriggerConfig::Expression(expression) => EventExpr::from(expression.as_str()),
            TriggerConfig::Condition(condition) => EventExpr::from(match condition {
                TriggerCondition::Runlevel(runlevel) => Runlevels::parse(runlevel)?.render(),
                TriggerCondition::Starting(service) => format!("starting {service}"),
                TriggerCondition::Started(service) => format!("started {service}"),
                TriggerCondition::Stopping(service) => format!("stopping {service}"),
                TriggerCondition::Stopped(service) => format!("stopped {service}"),
            }),
            TriggerConfig::Events(EventsTrigger { events, conjunct }) => EventExpr::Combined {
                events: events.iter().map(EventConfig::to_event).collect(),
                conjunct: conjunct.unwrap_or(Conjunct::And),
            },
        };
        Ok(expr)
    }
}

impl JobManifest {
    /// Applies every configured directive to a fresh builder.
    pub fn to_builder(&self) -> Result<JobBuilder, JobError> {
        let mut job = JobBuilder::new();

        if let Some(description) = &self.description {
            job.description(description)?;
        }
        if let Some(author) = &self.author {
            job.author(author)?;
        }
        if let Some(version) = &self.version {
            job.version(version)?;
        }
        if let Some(usage) = &self.usage {
            job.usage(usage)?;
        }
        if let Some(trigger) = &self.start_on {
            job.start_on(trigger.to_expr()?)?;
        }
        if let Some(trigger) = &self.stop_on {
            job.stop_on(trigger.to_expr()?)?;
        }
        for emits in self.emits.iter().flatten() {
            match emits {
                EmitsConfig::Event(event) => {
                    job.emits(event)?;
                }
                EmitsConfig::Group(events) => {
                    job.emits_all(events)?;
                }
            }
        }
        if let Some(instance) = &self.instance {
            job.instance(instance)?;
        }
        if self.manual {
            job.manual();
        }
        if self.task {
            job.task();
        }
        if self.respawn {
            job.respawn();
        }
        match &self.respawn_limit {
            Some(RespawnLimitConfig::Limit { count, interval }) => {
                job.respawn_limit(*count, *interval);
            }
            Some(RespawnLimitConfig::Keyword(keyword)) if keyword == "unlimited" => {
                job.respawn_unlimited();
            }
            Some(RespawnLimitConfig::Keyword(keyword)) => {
                return Err(JobError::invalid(
                    "respawn limit",
                    keyword,
                    "expected {count, interval} or 'unlimited'",
                ));
            }
            None => {}
        }
        if let Some(expect) = &self.expect {
            job.expect(expect)?;
        }
        if let Some(console) = &self.console {
            job.console(Some(console))?;
        }
        if let Some(normal_exit) = &self.normal_exit {
            job.normal_exit(&normal_exit.codes, &normal_exit.signals)?;
        }
        if let Some(timeout) = self.kill_timeout {
            job.kill_timeout(timeout);
        }
        if let Some(signal) = &self.kill_signal {
            job.kill_signal(signal)?;
        }
        if let Some(signal) = &self.reload_signal {
            job.reload_signal(signal)?;
        }
        if let Some(env) = &self.env {
            job.env_all(env.iter().map(|(key, value)| (key, value.to_string())))?;
        }
        for name in self.export.iter().flatten() {
            job.export(name)?;
        }
        if let Some(umask) = &self.umask {
            let mode = u32::from_str_radix(umask, 8)
                .map_err(|_| JobError::invalid("umask", umask, "expected an octal mode"))?;
            job.umask(mode)?;
        }
        if let Some(nice) = self.nice {
            job.nice(nice)?;
        }
        match &self.oom_score {
            Some(OomScoreConfig::Score(score)) => {
                job.oom_score(*score)?;
            }
            Some(OomScoreConfig::Keyword(keyword)) if keyword == "never" => {
                job.oom_never();
            }
            Some(OomScoreConfig::Keyword(keyword)) => {
                return Err(JobError::invalid(
                    "oom score",
                    keyword,
                    "expected a number or 'never'",
                ));
            }
            None => {}
        }
        for (resource, limit) in self.limits.iter().flatten() {
            job.limit(resource, limit.soft.value()?, limit.hard.value()?)?;
        }
        if let Some(path) = &self.chdir {
            job.chdir(path)?;
        }
        if let Some(path) = &self.chroot {
            job.chroot(path)?;
        }
        if let Some(user) = &self.setuid {
            job.setuid(user)?;
        }
        if let Some(group) = &self.setgid {
            job.setgid(group)?;
        }
        if let Some(path) = &self.apparmor_load {
            job.apparmor_load(path)?;
        }
        if let Some(profile) = &self.apparmor_switch {
            job.apparmor_switch(profile)?;
        }
        if let Some(hook) = &self.pre_start {
            job.pre_start(hook.to_input()?)?;
        }
        job.run(self.run.to_input()?)?;
        if let Some(hook) = &self.post_start {
            job.post_start(hook.to_input()?)?;
        }
        if let Some(hook) = &self.pre_stop {
            job.pre_stop(hook.to_input()?)?;
        }
        if let Some(hook) = &self.post_stop {
            job.post_stop(hook.to_input()?)?;
        }

        Ok(job)
    }
}

/// Expands `${VAR}` references from the process environment.
///
/// `$${VAR}` is written out as a literal `${VAR}`; bare `$VAR` is left alone so
/// embedded scripts keep their shell variables.
fn expand_env_vars(input: &str) -> Result<String, ManifestError> {
    let mut missing = None;
    let result = ENV_REFERENCE.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[2];
        if caps.get(1).is_some() {
            return format!("${{{var_name}}}");
        }

        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ManifestError::MissingEnvVar(var_name)),
        None => Ok(result.into_owned()),
    }
}

/// Parses manifest text after environment expansion.
pub fn parse_manifest(content: &str) -> Result<JobManifest, ManifestError> {
    let expanded = expand_env_vars(content)?;
    let manifest: JobManifest =
        serde_yaml::from_str(&expanded).map_err(ManifestError::ParseError)?;
    Ok(manifest)
}

/// Loads and parses a manifest file, expanding environment variables.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<JobManifest, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        ManifestError::ReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, path.display()),
        ))
    })?;

    debug!("Loaded job manifest from {}", path.display());
    let mut manifest = parse_manifest(&content)?;
    if manifest.name.is_none() {
        manifest.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string());
    }
    Ok(manifest)
}
