//! Priority resolution: turns the live claims on a channel into one final
//! state.

use std::cmp::{Ordering, Reverse};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::{ActuatorChannel, DesiredState};
use crate::claim::{ControlClaim, SourceKind};
use crate::time::Timestamp;

/// Why a decision fell back to the failsafe state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailsafeReason {
    /// No source holds a live claim on the channel.
    NoLiveClaim,
    /// Evaluation failed this many times in a row.
    RepeatedFailures { count: u32 },
}

impl fmt::Display for FailsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLiveClaim => f.write_str("failsafe: no live claim"),
            Self::RepeatedFailures { count } => {
                write!(f, "failsafe: {count} consecutive evaluation failures")
            }
        }
    }
}

/// Outcome of one resolution pass over a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDecision {
    pub channel: ActuatorChannel,
    pub final_state: DesiredState,
    pub winning_source: SourceKind,
    pub winning_reason: String,
    pub timestamp: Timestamp,
    /// Set when the decision is the failsafe fallback.
    pub failsafe: Option<FailsafeReason>,
}

impl ResolvedDecision {
    #[must_use]
    pub fn is_failsafe(&self) -> bool {
        self.failsafe.is_some()
    }

    /// Whether two decisions drive the channel the same way, ignoring when
    /// they were made and the wording of the reason.
    #[must_use]
    pub fn same_outcome(&self, other: &Self) -> bool {
        self.channel.id == other.channel.id
            && self.final_state == other.final_state
            && self.winning_source == other.winning_source
            && self.is_failsafe() == other.is_failsafe()
    }
}

/// Pick the winning claim among `claims` for `channel`.
///
/// Claims for other channels and claims expired at `now` are ignored.
/// Sources listed in `overrides` beat every other source, earlier entries
/// first; the rest rank by [`SourceKind::priority`]. Ties go to the newest
/// claim, then to the higher desired state, then to the reason text, so the
/// result never depends on the order of `claims`.
///
/// Returns `None` when no live claim remains.
#[must_use]
pub fn resolve(
    channel: &ActuatorChannel,
    claims: &[ControlClaim],
    overrides: &[SourceKind],
    now: Timestamp,
) -> Option<ResolvedDecision> {
    let winner = claims
        .iter()
        .filter(|claim| claim.channel.id == channel.id && claim.is_live(now))
        .max_by(|a, b| rank(a, b, overrides))?;

    Some(ResolvedDecision {
        channel: channel.clone(),
        final_state: winner.desired_state,
        winning_source: winner.source,
        winning_reason: winner.reason.clone(),
        timestamp: now,
        failsafe: None,
    })
}

/// The decision driving `channel` to its failsafe state.
#[must_use]
pub fn failsafe_decision(
    channel: &ActuatorChannel,
    state: DesiredState,
    reason: FailsafeReason,
    now: Timestamp,
) -> ResolvedDecision {
    ResolvedDecision {
        channel: channel.clone(),
        final_state: state,
        winning_source: SourceKind::Default,
        winning_reason: reason.to_string(),
        timestamp: now,
        failsafe: Some(reason),
    }
}

fn rank(a: &ControlClaim, b: &ControlClaim, overrides: &[SourceKind]) -> Ordering {
    let strength = |claim: &ControlClaim| {
        let overridden = overrides
            .iter()
            .position(|source| *source == claim.source)
            .map(Reverse);
        (overridden, claim.source.priority())
    };
    strength(a)
        .cmp(&strength(b))
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.desired_state.cmp(&b.desired_state))
        .then_with(|| a.reason.cmp(&b.reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ActuatorKind;
    use crate::id::DeviceId;
    use chrono::{Duration, TimeZone, Utc};

    fn pump() -> ActuatorChannel {
        ActuatorChannel::new(DeviceId::new("esp32-a").unwrap(), 5, ActuatorKind::Pump)
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn claim(source: SourceKind, on: bool, ts: Timestamp) -> ControlClaim {
        ControlClaim::new(
            pump(),
            source,
            DesiredState::Binary(on),
            source.as_str(),
            ts,
        )
    }

    #[test]
    fn should_let_manual_beat_logic() {
        let claims = vec![
            claim(SourceKind::Logic, false, at(0)),
            claim(SourceKind::Manual, true, at(0)),
        ];
        let decision = resolve(&pump(), &claims, &[], at(1)).unwrap();
        assert_eq!(decision.final_state, DesiredState::Binary(true));
        assert_eq!(decision.winning_source, SourceKind::Manual);
        assert!(!decision.is_failsafe());
    }

    #[test]
    fn should_return_none_without_live_claims() {
        let expired = claim(SourceKind::Manual, true, at(0)).expires_after(Duration::seconds(10));
        assert!(resolve(&pump(), &[expired], &[], at(10)).is_none());
        assert!(resolve(&pump(), &[], &[], at(0)).is_none());
    }

    #[test]
    fn should_ignore_expired_higher_priority_claim() {
        let claims = vec![
            claim(SourceKind::Emergency, true, at(0)).expires_after(Duration::seconds(5)),
            claim(SourceKind::Schedule, false, at(0)),
        ];
        let decision = resolve(&pump(), &claims, &[], at(6)).unwrap();
        assert_eq!(decision.winning_source, SourceKind::Schedule);
    }

    #[test]
    fn should_ignore_claims_for_other_channels() {
        let other = ActuatorChannel::new(DeviceId::new("esp32-a").unwrap(), 6, ActuatorKind::Pump);
        let mut foreign = claim(SourceKind::Emergency, true, at(0));
        foreign.channel = other;
        let claims = vec![foreign, claim(SourceKind::Timer, false, at(0))];
        let decision = resolve(&pump(), &claims, &[], at(1)).unwrap();
        assert_eq!(decision.winning_source, SourceKind::Timer);
    }

    #[test]
    fn should_apply_overrides_before_priority_table() {
        let claims = vec![
            claim(SourceKind::Emergency, false, at(0)),
            claim(SourceKind::Logic, true, at(0)),
            claim(SourceKind::Timer, true, at(0)),
        ];
        let overrides = [SourceKind::Timer, SourceKind::Logic];
        let decision = resolve(&pump(), &claims, &overrides, at(1)).unwrap();
        assert_eq!(decision.winning_source, SourceKind::Timer);

        let decision = resolve(&pump(), &claims[..2], &overrides, at(1)).unwrap();
        assert_eq!(decision.winning_source, SourceKind::Logic);
    }

    #[test]
    fn should_be_independent_of_claim_order() {
        let mut claims = vec![
            claim(SourceKind::Alert, true, at(3)),
            claim(SourceKind::Alert, false, at(3)),
            claim(SourceKind::Logic, true, at(9)),
            claim(SourceKind::Alert, false, at(1)),
        ];
        let expected = resolve(&pump(), &claims, &[], at(10)).unwrap();
        assert_eq!(expected.final_state, DesiredState::Binary(true));
        for _ in 0..claims.len() {
            claims.rotate_left(1);
            assert_eq!(resolve(&pump(), &claims, &[], at(10)).unwrap(), expected);
            claims.reverse();
            assert_eq!(resolve(&pump(), &claims, &[], at(10)).unwrap(), expected);
        }
    }

    #[test]
    fn should_prefer_newest_claim_on_priority_tie() {
        let claims = vec![
            claim(SourceKind::Manual, true, at(5)),
            claim(SourceKind::Manual, false, at(8)),
        ];
        let decision = resolve(&pump(), &claims, &[], at(9)).unwrap();
        assert_eq!(decision.final_state, DesiredState::Binary(false));
    }

    #[test]
    fn should_build_failsafe_decision_from_default_source() {
        let decision = failsafe_decision(
            &pump(),
            DesiredState::Binary(false),
            FailsafeReason::NoLiveClaim,
            at(0),
        );
        assert_eq!(decision.winning_source, SourceKind::Default);
        assert_eq!(decision.failsafe, Some(FailsafeReason::NoLiveClaim));
        assert_eq!(decision.winning_reason, "failsafe: no live claim");
    }

    #[test]
    fn should_compare_outcomes_without_timestamps() {
        let early = [claim(SourceKind::Logic, true, at(0))];
        let late = [claim(SourceKind::Logic, true, at(30))];
        let a = resolve(&pump(), &early, &[], at(1)).unwrap();
        let b = resolve(&pump(), &late, &[], at(31)).unwrap();
        assert!(a.same_outcome(&b));
        let c = failsafe_decision(
            &pump(),
            DesiredState::Binary(true),
            FailsafeReason::NoLiveClaim,
            at(2),
        );
        assert!(!a.same_outcome(&c));
    }
}
