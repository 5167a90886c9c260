//! Claim: a desired state for a channel proposed by one control source.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::channel::{ActuatorChannel, DesiredState};
use crate::error::ValidationError;
use crate::time::Timestamp;

/// Every authority that may command a channel, ordered by priority.
///
/// The numeric priority lives here and nowhere else; resolution compares
/// [`priority`](Self::priority) values, so reordering authorities is a
/// one-line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Emergency,
    Manual,
    Alert,
    Logic,
    Timer,
    Schedule,
    /// Reserved for the engine's failsafe decisions.
    Default,
}

impl SourceKind {
    /// All sources, highest priority first.
    pub const ALL: [Self; 7] = [
        Self::Emergency,
        Self::Manual,
        Self::Alert,
        Self::Logic,
        Self::Timer,
        Self::Schedule,
        Self::Default,
    ];

    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::Emergency => 100,
            Self::Manual => 90,
            Self::Alert => 80,
            Self::Logic => 70,
            Self::Timer => 60,
            Self::Schedule => 50,
            Self::Default => 0,
        }
    }

    /// Whether external producers may submit claims from this source.
    #[must_use]
    pub fn is_submittable(self) -> bool {
        !matches!(self, Self::Default)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Manual => "manual",
            Self::Alert => "alert",
            Self::Logic => "logic",
            Self::Timer => "timer",
            Self::Schedule => "schedule",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| ValidationError::UnknownSource(s.to_string()))
    }
}

/// A proposed state for a channel from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlClaim {
    pub channel: ActuatorChannel,
    pub source: SourceKind,
    pub desired_state: DesiredState,
    pub reason: String,
    pub timestamp: Timestamp,
    pub expiry: Option<Timestamp>,
}

impl ControlClaim {
    #[must_use]
    pub fn new(
        channel: ActuatorChannel,
        source: SourceKind,
        desired_state: DesiredState,
        reason: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            channel,
            source,
            desired_state,
            reason: reason.into(),
            timestamp,
            expiry: None,
        }
    }

    /// Expire the claim at an absolute time.
    #[must_use]
    pub fn expires_at(mut self, expiry: Timestamp) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Expire the claim `ttl` after its own timestamp.
    #[must_use]
    pub fn expires_after(self, ttl: Duration) -> Self {
        let expiry = self.timestamp + ttl;
        self.expires_at(expiry)
    }

    /// A claim is live until its expiry; the expiry instant itself is dead.
    #[must_use]
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expiry.is_none_or(|expiry| expiry > now)
    }
}
