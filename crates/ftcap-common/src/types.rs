//! Domain primitive types used across the ftcap workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// An FTrace event identifier of the form `category:event`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId {
    raw: String,
    split: usize,
}

impl EventId {
    /// Parses and validates an event identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Config`] unless the input is exactly one
    /// `category:event` pair with both halves non-empty and free of path
    /// separators and whitespace.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let invalid = |why: &str| TraceError::Config {
            message: format!("invalid event identifier '{raw}': {why}"),
        };

        let Some(split) = raw.find(':') else {
            return Err(invalid("expected category:event"));
        };
        let (category, name) = (&raw[..split], &raw[split + 1..]);
        if category.is_empty() || name.is_empty() {
            return Err(invalid("category and event must be non-empty"));
        }
        if name.contains(':') {
            return Err(invalid("more than one ':'"));
        }
        if raw.contains('/') || raw.chars().any(char::is_whitespace) {
            return Err(invalid("contains '/' or whitespace"));
        }
        Ok(Self { raw, split })
    }

    /// Returns the category half, e.g. `sched`.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.raw[..self.split]
    }

    /// Returns the event half, e.g. `sched_switch`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    /// Returns the full `category:event` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EventId {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventId {
    type Error = TraceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<EventId> for String {
    fn from(value: EventId) -> Self {
        value.raw
    }
}

/// Lifecycle state of a trace session.
///
/// `Failed` is terminal and reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing has touched the kernel yet.
    Idle,
    /// Tracing is being (or has been) configured; the clear guard is held.
    Configuring,
    /// Tracing is on and CPU streams are open.
    Tracing,
    /// Tracing is being turned off and the streams flushed.
    Stopping,
    /// The session finished cleanly.
    Stopped,
    /// The session hit an unrecoverable error.
    Failed,
}

impl SessionState {
    /// Whether the session currently holds kernel resources that teardown
    /// must release.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Configuring | Self::Tracing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Configuring => write!(f, "configuring"),
            Self::Tracing => write!(f, "tracing"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
