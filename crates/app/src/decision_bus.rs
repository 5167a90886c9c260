//! Decision bus: hands every emitted decision to the actuator drivers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use greenhub_domain::channel::ChannelId;
use greenhub_domain::error::GreenhubError;
use greenhub_domain::resolution::ResolvedDecision;

use crate::ports::DecisionPublisher;

/// Broadcasts decisions as they are emitted and remembers the latest one
/// per channel, so a driver that (re)connects can command its actuator
/// before the next change arrives.
pub struct DecisionBus {
    sender: broadcast::Sender<ResolvedDecision>,
    latest: RwLock<HashMap<ChannelId, ResolvedDecision>>,
}

impl DecisionBus {
    /// `capacity` is how many decisions a slow subscriber may fall behind
    /// before it starts missing them.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Decisions emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResolvedDecision> {
        self.sender.subscribe()
    }

    /// The last decision emitted for `channel`.
    #[must_use]
    pub fn current(&self, channel: &ChannelId) -> Option<ResolvedDecision> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }
}

impl DecisionPublisher for DecisionBus {
    fn publish(
        &self,
        decision: ResolvedDecision,
    ) -> impl Future<Output = Result<(), GreenhubError>> + Send {
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(decision.channel.id.clone(), decision.clone());
        // no driver listening yet is not an error
        let _ = self.sender.send(decision);
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use greenhub_domain::channel::{ActuatorChannel, ActuatorKind, DesiredState};
    use greenhub_domain::id::DeviceId;
    use greenhub_domain::resolution::{FailsafeReason, failsafe_decision};

    fn fan(gpio: u8) -> ActuatorChannel {
        ActuatorChannel::new(DeviceId::new("esp32-a").unwrap(), gpio, ActuatorKind::Fan)
    }

    fn decision(gpio: u8, level: u8) -> ResolvedDecision {
        failsafe_decision(
            &fan(gpio),
            DesiredState::Level(level),
            FailsafeReason::NoLiveClaim,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn should_deliver_decision_to_every_driver() {
        let bus = DecisionBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(decision(4, 0)).await.unwrap();

        assert_eq!(first.recv().await.unwrap().channel.id.gpio, 4);
        assert_eq!(second.recv().await.unwrap().channel.id.gpio, 4);
    }

    #[tokio::test]
    async fn should_remember_latest_decision_without_subscribers() {
        let bus = DecisionBus::new(16);
        bus.publish(decision(1, 0)).await.unwrap();
        bus.publish(decision(1, 40)).await.unwrap();
        bus.publish(decision(2, 10)).await.unwrap();

        let current = bus.current(&fan(1).id).unwrap();
        assert_eq!(current.final_state, DesiredState::Level(40));
        assert!(bus.current(&fan(3).id).is_none());
    }

    #[tokio::test]
    async fn should_report_lag_to_slow_driver() {
        let bus = DecisionBus::new(1);
        let mut slow = bus.subscribe();
        bus.publish(decision(1, 0)).await.unwrap();
        bus.publish(decision(2, 0)).await.unwrap();

        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(slow.recv().await.unwrap().channel.id.gpio, 2);
    }
}
