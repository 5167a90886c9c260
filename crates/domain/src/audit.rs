//! Audit trail: one entry per observable change in a channel's decision.

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelId, DesiredState};
use crate::claim::SourceKind;
use crate::error::ValidationError;
use crate::id::AuditEntryId;
use crate::resolution::ResolvedDecision;
use crate::time::Timestamp;

/// Kind of change recorded by an [`AuditLogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// The final state changed.
    StateChanged,
    /// Same state, different winning source.
    SourceChanged,
    /// The channel entered failsafe.
    FailsafeActivated,
    /// The channel left failsafe.
    FailsafeCleared,
}

impl AuditEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateChanged => "state_changed",
            Self::SourceChanged => "source_changed",
            Self::FailsafeActivated => "failsafe_activated",
            Self::FailsafeCleared => "failsafe_cleared",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "state_changed" => Ok(Self::StateChanged),
            "source_changed" => Ok(Self::SourceChanged),
            "failsafe_activated" => Ok(Self::FailsafeActivated),
            "failsafe_cleared" => Ok(Self::FailsafeCleared),
            other => Err(ValidationError::UnknownAuditEvent(other.to_string())),
        }
    }
}

/// A recorded transition between two decisions on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub channel: ChannelId,
    pub event_type: AuditEventType,
    pub prior_source: Option<SourceKind>,
    pub new_source: SourceKind,
    pub prior_state: Option<DesiredState>,
    pub new_state: DesiredState,
    pub trigger_reason: String,
    pub timestamp: Timestamp,
}

impl AuditLogEntry {
    /// The entry for moving from `previous` to `next`, or `None` when the
    /// outcome did not change.
    ///
    /// Entering or leaving failsafe takes precedence over a plain state or
    /// source change.
    #[must_use]
    pub fn transition(
        previous: Option<&ResolvedDecision>,
        next: &ResolvedDecision,
    ) -> Option<Self> {
        let event_type = match previous {
            Some(prev) if prev.same_outcome(next) => return None,
            Some(prev) => match (prev.is_failsafe(), next.is_failsafe()) {
                (false, true) => AuditEventType::FailsafeActivated,
                (true, false) => AuditEventType::FailsafeCleared,
                _ if prev.final_state != next.final_state => AuditEventType::StateChanged,
                _ => AuditEventType::SourceChanged,
            },
            None if next.is_failsafe() => AuditEventType::FailsafeActivated,
            None => AuditEventType::StateChanged,
        };

        Some(Self {
            id: AuditEntryId::new(),
            channel: next.channel.id.clone(),
            event_type,
            prior_source: previous.map(|prev| prev.winning_source),
            new_source: next.winning_source,
            prior_state: previous.map(|prev| prev.final_state),
            new_state: next.final_state,
            trigger_reason: next.winning_reason.clone(),
            timestamp: next.timestamp,
        })
    }
}
