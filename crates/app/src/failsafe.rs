//! Failsafe monitor: decides what a channel does when resolution yields
//! nothing or keeps failing.

use greenhub_domain::channel::{ActuatorChannel, DesiredState};
use greenhub_domain::claim::SourceKind;
use greenhub_domain::error::EvaluationError;
use greenhub_domain::resolution::{FailsafeReason, ResolvedDecision, failsafe_decision};
use greenhub_domain::time::Timestamp;

/// Consecutive failures after which the channel is forced to failsafe.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Per-channel failure tracking. Owned by the channel's evaluator.
#[derive(Debug)]
pub struct FailsafeMonitor {
    threshold: u32,
    consecutive_failures: u32,
    last: Option<ResolvedDecision>,
}

impl Default for FailsafeMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

/// Whether the decision was won by a source that automation evaluation
/// does not produce (`Emergency`, `Manual`, `Alert`).
fn outranks_automation(decision: &ResolvedDecision) -> bool {
    decision.winning_source.priority() > SourceKind::Logic.priority()
}

impl FailsafeMonitor {
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            last: None,
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Turn one tick's automation outcome and the resolution of the live
    /// claims into a decision.
    ///
    /// When `evaluation` succeeded the resolved decision is returned as is,
    /// or the failsafe decision when no claim is live, and the failure count
    /// resets. When it failed the count goes up and:
    ///
    /// - a live `Emergency`, `Manual` or `Alert` winner is still returned
    /// - otherwise the previous automation decision is held until the
    ///   threshold is reached, then the failsafe decision is returned
    pub fn guard(
        &mut self,
        channel: &ActuatorChannel,
        failsafe_state: DesiredState,
        now: Timestamp,
        evaluation: Result<(), EvaluationError>,
        resolved: Option<ResolvedDecision>,
    ) -> ResolvedDecision {
        let decision = match evaluation {
            Ok(()) => {
                self.consecutive_failures = 0;
                resolved.unwrap_or_else(|| {
                    failsafe_decision(channel, failsafe_state, FailsafeReason::NoLiveClaim, now)
                })
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let count = self.consecutive_failures;
                tracing::warn!(
                    channel = %channel.id,
                    failures = count,
                    threshold = self.threshold,
                    error = %err,
                    "evaluation failed"
                );
                let held = self
                    .last
                    .as_ref()
                    .filter(|last| count < self.threshold && !outranks_automation(last));
                match (resolved, held) {
                    (Some(live), _) if outranks_automation(&live) => live,
                    (_, Some(held)) => held.clone(),
                    (Some(live), None) if count < self.threshold => live,
                    _ => failsafe_decision(
                        channel,
                        failsafe_state,
                        FailsafeReason::RepeatedFailures { count },
                        now,
                    ),
                }
            }
        };
        self.last = Some(decision.clone());
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use greenhub_domain::channel::ActuatorKind;
    use greenhub_domain::claim::ControlClaim;
    use greenhub_domain::id::DeviceId;
    use greenhub_domain::resolution::resolve;

    fn heater() -> ActuatorChannel {
        ActuatorChannel::new(DeviceId::new("esp32-c").unwrap(), 2, ActuatorKind::Heater)
    }

    fn now() -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn resolved(source: SourceKind, state: DesiredState) -> Option<ResolvedDecision> {
        let claim = ControlClaim::new(heater(), source, state, "test", now());
        resolve(&heater(), &[claim], &[], now())
    }

    fn heating() -> Option<ResolvedDecision> {
        resolved(SourceKind::Logic, DesiredState::Binary(true))
    }

    fn failing() -> Result<(), EvaluationError> {
        Err(EvaluationError::SnapshotUnavailable(
            "bridge offline".to_string(),
        ))
    }

    const OFF: DesiredState = DesiredState::Binary(false);

    #[test]
    fn should_return_failsafe_when_no_claim_is_live() {
        let mut monitor = FailsafeMonitor::default();
        let decision = monitor.guard(&heater(), OFF, now(), Ok(()), None);
        assert_eq!(decision.final_state, OFF);
        assert_eq!(decision.winning_source, SourceKind::Default);
        assert_eq!(decision.failsafe, Some(FailsafeReason::NoLiveClaim));
    }

    #[test]
    fn should_hold_last_decision_below_threshold() {
        let mut monitor = FailsafeMonitor::new(3);
        let good = monitor.guard(&heater(), OFF, now(), Ok(()), heating());
        assert_eq!(monitor.guard(&heater(), OFF, now(), failing(), None), good);
        assert_eq!(monitor.guard(&heater(), OFF, now(), failing(), None), good);
        assert_eq!(monitor.consecutive_failures(), 2);

        let forced = monitor.guard(&heater(), OFF, now(), failing(), None);
        assert_eq!(forced.final_state, OFF);
        assert_eq!(forced.failsafe, Some(FailsafeReason::RepeatedFailures { count: 3 }));
    }

    #[test]
    fn should_go_to_failsafe_on_first_failure_without_history() {
        let mut monitor = FailsafeMonitor::new(3);
        let decision = monitor.guard(&heater(), OFF, now(), failing(), None);
        assert_eq!(decision.failsafe, Some(FailsafeReason::RepeatedFailures { count: 1 }));
    }

    #[test]
    fn should_reset_counter_after_success() {
        let mut monitor = FailsafeMonitor::new(2);
        monitor.guard(&heater(), OFF, now(), Ok(()), heating());
        monitor.guard(&heater(), OFF, now(), failing(), None);
        monitor.guard(&heater(), OFF, now(), Ok(()), heating());
        assert_eq!(monitor.consecutive_failures(), 0);
        let held = monitor.guard(&heater(), OFF, now(), failing(), None);
        assert!(!held.is_failsafe());
    }

    #[test]
    fn should_let_live_emergency_win_while_evaluation_fails() {
        let mut monitor = FailsafeMonitor::new(2);
        monitor.guard(&heater(), OFF, now(), Ok(()), heating());

        let emergency = resolved(SourceKind::Emergency, OFF);
        let decision = monitor.guard(&heater(), OFF, now(), failing(), emergency.clone());
        assert_eq!(decision.winning_source, SourceKind::Emergency);

        // past the threshold the emergency still wins over the failsafe
        let decision = monitor.guard(&heater(), OFF, now(), failing(), emergency);
        assert_eq!(monitor.consecutive_failures(), 2);
        assert_eq!(decision.winning_source, SourceKind::Emergency);
        assert!(!decision.is_failsafe());
    }

    #[test]
    fn should_not_hold_manual_decision_after_its_claim_is_gone() {
        let mut monitor = FailsafeMonitor::new(3);
        let manual = resolved(SourceKind::Manual, DesiredState::Binary(true));
        monitor.guard(&heater(), OFF, now(), failing(), manual);

        let decision = monitor.guard(&heater(), OFF, now(), failing(), None);
        assert_eq!(decision.failsafe, Some(FailsafeReason::RepeatedFailures { count: 2 }));
    }
}
