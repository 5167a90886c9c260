//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`GreenhubError`] via `#[from]`.

use std::fmt;

use crate::channel::{ActuatorKind, ChannelId};
use crate::claim::SourceKind;
use crate::time::Timestamp;

/// Top-level error returned by use-cases.
#[derive(Debug, thiserror::Error)]
pub enum GreenhubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error(transparent)]
    Adaptation(#[from] AdaptationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("claim rejected")]
    Claim(#[from] ClaimError),

    #[error("storage error")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

/// A logic configuration or claim breaks a domain invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("evaluation interval must be at least {min_ms} ms")]
    IntervalTooShort { min_ms: u64 },

    #[error("level {0} is out of range 0..=100")]
    LevelOutOfRange(u8),

    #[error("{kind} actuators only accept on/off states")]
    LevelOnBinaryActuator { kind: ActuatorKind },

    #[error("the default source cannot be used in {0}")]
    ReservedSource(&'static str),

    #[error("priority override for {0} is listed twice")]
    DuplicateOverride(SourceKind),

    #[error("event trigger name must not be empty")]
    EmptyTriggerName,

    #[error("device id must be non-empty and must not contain '/' or ':'")]
    InvalidDeviceId,

    #[error("invalid sensor reference `{0}`")]
    InvalidSensorRef(String),

    #[error("invalid time of day `{0}`, expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("invalid weekday `{0}`")]
    InvalidWeekday(String),

    #[error("unknown actuator kind `{0}`")]
    UnknownActuatorKind(String),

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("unknown control source `{0}`")]
    UnknownSource(String),

    #[error("unknown audit event type `{0}`")]
    UnknownAuditEvent(String),
}

/// A requested record does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// One offending field in an imported logic document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path to the field, e.g. `actuator.type` or `timers[1].start`.
    pub path: String,
    pub problem: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

/// A logic document does not match the expected schema.
///
/// Lists every offending field rather than stopping at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("document failed schema validation: {}", join(.issues))]
pub struct SchemaValidationError {
    pub issues: Vec<FieldIssue>,
}

impl SchemaValidationError {
    /// Whether an issue was reported for the given field path.
    #[must_use]
    pub fn mentions(&self, path: &str) -> bool {
        self.issues.iter().any(|issue| issue.path == path)
    }
}

/// A configuration could not be carried over to another channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot adapt logic from {source_channel} to {target_channel}: {}", .problems.join("; "))]
pub struct AdaptationError {
    pub source_channel: ChannelId,
    pub target_channel: ChannelId,
    pub problems: Vec<String>,
}

/// Why the source registry refused a claim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("channel {0} is not registered")]
    UnknownChannel(ChannelId),

    #[error("channel {channel} is a {expected} actuator, claim targets a {found}")]
    KindMismatch {
        channel: ChannelId,
        expected: ActuatorKind,
        found: ActuatorKind,
    },

    #[error("invalid desired state")]
    InvalidState(#[from] ValidationError),

    #[error("{source_kind} claim from {submitted} is older than the live one from {stored}")]
    StaleClaim {
        source_kind: SourceKind,
        stored: Timestamp,
        submitted: Timestamp,
    },

    #[error("claim intake is closed")]
    IntakeClosed,
}

/// A per-tick evaluation failure, counted by the failsafe monitor.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("sensor snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("evaluation took {elapsed_ms} ms, budget is {budget_ms} ms")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },

    #[error("active configuration is invalid")]
    InvalidConfiguration(#[from] ValidationError),
}

fn join(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
