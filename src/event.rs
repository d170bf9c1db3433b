//! Event expressions for `start on` / `stop on` directives.
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{
    error::JobError,
    job::{escape, validate_identifier, validate_single_line},
};

static RUNLEVELS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!?[0-6Ss]+$").expect("runlevel pattern is valid"));

/// Keyword joining several events in one expression.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Conjunct {
    And,
    Or,
}

/// A single trigger event, optionally matched on environment assignments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    name: String,
    env: IndexMap<String, String>,
}

impl Event {
    /// Event matched by name alone. The name is written verbatim, so a
    /// pre-built expression such as `"net-device-up IFACE!=lo"` is accepted too.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: IndexMap::new(),
        }
    }

    /// Adds an environment match. Reusing a key replaces its value in place.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &IndexMap<String, String> {
        &self.env
    }

    /// Renders `name k1="v1" k2="v2"`.
    pub fn render(&self, directive: &str) -> Result<String, JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::invalid(directive, &self.name, "event name is empty"));
        }
        validate_single_line(directive, &self.name)?;

        let mut out = self.name.clone();
        for (key, value) in &self.env {
            validate_identifier(directive, key)?;
            validate_single_line(directive, value)?;
            out.push_str(&format!(" {key}=\"{}\"", escape(value)));
        }
        Ok(out)
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::new(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::new(name)
    }
}

/// One event, or several joined by a conjunction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventExpr {
    Single(Event),
    Combined {
        events: Vec<Event>,
        conjunct: Conjunct,
    },
}

impl EventExpr {
    /// Events that must all occur.
    pub fn all<E: Into<Event>>(events: impl IntoIterator<Item = E>) -> Self {
        EventExpr::Combined {
            events: events.into_iter().map(Into::into).collect(),
            conjunct: Conjunct::And,
        }
    }

    /// Events of which any one suffices.
    pub fn any<E: Into<Event>>(events: impl IntoIterator<Item = E>) -> Self {
        EventExpr::Combined {
            events: events.into_iter().map(Into::into).collect(),
            conjunct: Conjunct::Or,
        }
    }

    /// Renders the expression for `directive` (used in error reports).
    pub fn render(&self, directive: &str) -> Result<String, JobError> {
        match self {
            EventExpr::Single(event) => event.render(directive),
            EventExpr::Combined { events, conjunct } => {
                if events.is_empty() {
                    return Err(JobError::invalid(
                        directive,
                        "",
                        format!("'{conjunct}' expression has no events"),
                    ));
                }

                let rendered = events
                    .iter()
                    .map(|event| event.render(directive))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rendered.join(&format!(" {conjunct} ")))
            }
        }
    }
}

impl From<Event> for EventExpr {
    fn from(event: Event) -> Self {
        EventExpr::Single(event)
    }
}

impl From<&str> for EventExpr {
    fn from(name: &str) -> Self {
        EventExpr::Single(Event::new(name))
    }
}

impl From<String> for EventExpr {
    fn from(name: String) -> Self {
        EventExpr::Single(Event::new(name))
    }
}

/// A runlevel set such as `2345` or `!2345`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Runlevels(String);

impl Runlevels {
    /// Runlevels a typical service starts in.
    pub const DEFAULT_START: &'static str = "2345";
    /// Runlevels a typical service stops in.
    pub const DEFAULT_STOP: &'static str = "!2345";

    /// Parses a runlevel set: an optional leading `!` followed by levels `0-6` or `S`.
    pub fn parse(levels: &str) -> Result<Self, JobError> {
        if RUNLEVELS.is_match(levels) {
            Ok(Self(levels.to_string()))
        } else {
            Err(JobError::invalid(
                "runlevel",
                levels,
                "expected runlevels 0-6/S with an optional leading '!'",
            ))
        }
    }

    /// Builds a set from numeric levels, each between 0 and 6.
    pub fn of(levels: impl IntoIterator<Item = u8>) -> Result<Self, JobError> {
        let mut joined = String::new();
        for level in levels {
            if level > 6 {
                return Err(JobError::invalid(
                    "runlevel",
                    level.to_string(),
                    "expected a runlevel between 0 and 6",
                ));
            }
            joined.push_str(&level.to_string());
        }
        Self::parse(&joined)
    }

    /// The complementary set, written with `!`.
    pub fn negated(&self) -> Self {
        match self.0.strip_prefix('!') {
            Some(levels) => Self(levels.to_string()),
            None => Self(format!("!{}", self.0)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders `runlevel [<levels>]`.
    pub fn render(&self) -> String {
        format!("runlevel [{}]", self.0)
    }
}
