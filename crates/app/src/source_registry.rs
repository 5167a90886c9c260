//! Source registry: the live claims of every registered channel.
//!
//! Each source holds at most one claim per channel; a newer claim from the
//! same source replaces the older one. Expired claims are pruned lazily when
//! the claims of a channel are read.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use greenhub_domain::channel::{ActuatorChannel, ChannelId};
use greenhub_domain::claim::{ControlClaim, SourceKind};
use greenhub_domain::error::{ClaimError, ValidationError};
use greenhub_domain::time::Timestamp;

#[derive(Debug)]
struct ChannelClaims {
    channel: ActuatorChannel,
    claims: HashMap<SourceKind, ControlClaim>,
}

/// Thread-safe store of claims, keyed by channel.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    channels: RwLock<HashMap<ChannelId, ChannelClaims>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a channel claimable. Re-registering keeps existing claims as long
    /// as the actuator kind is unchanged.
    pub fn register_channel(&self, channel: ActuatorChannel) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let unchanged = channels
            .get(&channel.id)
            .is_some_and(|existing| existing.channel.kind == channel.kind);
        if unchanged {
            return;
        }
        tracing::debug!(channel = %channel.id, kind = %channel.kind, "channel registered");
        channels.insert(
            channel.id.clone(),
            ChannelClaims {
                channel,
                claims: HashMap::new(),
            },
        );
    }

    /// Remove a channel and all its claims. Returns whether it was registered.
    pub fn unregister_channel(&self, id: &ChannelId) -> bool {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.remove(id).is_some()
    }

    #[must_use]
    pub fn channel(&self, id: &ChannelId) -> Option<ActuatorChannel> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.get(id).map(|entry| entry.channel.clone())
    }

    /// Every registered channel, ordered by id.
    #[must_use]
    pub fn channels(&self) -> Vec<ActuatorChannel> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = channels
            .values()
            .map(|entry| entry.channel.clone())
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Store a claim, replacing the previous claim of the same source.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError`] when:
    /// - the channel is not registered, or is of another actuator kind
    /// - the claim comes from the default source
    /// - the desired state does not fit the actuator
    /// - a live claim from the same source is newer than this one
    pub fn submit(&self, claim: ControlClaim) -> Result<(), ClaimError> {
        if !claim.source.is_submittable() {
            return Err(ValidationError::ReservedSource("claims").into());
        }

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = channels
            .get_mut(&claim.channel.id)
            .ok_or_else(|| ClaimError::UnknownChannel(claim.channel.id.clone()))?;

        if entry.channel.kind != claim.channel.kind {
            return Err(ClaimError::KindMismatch {
                channel: entry.channel.id.clone(),
                expected: entry.channel.kind,
                found: claim.channel.kind,
            });
        }
        entry.channel.kind.check_state(claim.desired_state)?;

        if let Some(stored) = entry.claims.get(&claim.source)
            && stored.is_live(claim.timestamp)
            && stored.timestamp > claim.timestamp
        {
            return Err(ClaimError::StaleClaim {
                source_kind: claim.source,
                stored: stored.timestamp,
                submitted: claim.timestamp,
            });
        }

        tracing::trace!(
            channel = %claim.channel.id,
            source = ?claim.source,
            state = %claim.desired_state,
            "claim stored"
        );
        entry.claims.insert(claim.source, claim);
        Ok(())
    }

    /// Remove the claim `source` holds on a channel, if any.
    pub fn withdraw(&self, id: &ChannelId, source: SourceKind) -> Option<ControlClaim> {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let removed = channels.get_mut(id)?.claims.remove(&source);
        if removed.is_some() {
            tracing::trace!(channel = %id, source = ?source, "claim withdrawn");
        }
        removed
    }

    /// Live claims on a channel at `now`, strongest source first. Expired
    /// claims are dropped from the registry.
    #[must_use]
    pub fn claims(&self, id: &ChannelId, now: Timestamp) -> Vec<ControlClaim> {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = channels.get_mut(id) else {
            return Vec::new();
        };
        entry.claims.retain(|_, claim| claim.is_live(now));
        let mut live: Vec<_> = entry.claims.values().cloned().collect();
        live.sort_by_key(|claim| std::cmp::Reverse(claim.source.priority()));
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use greenhub_domain::channel::{ActuatorKind, DesiredState};
    use greenhub_domain::id::DeviceId;

    fn pump() -> ActuatorChannel {
        ActuatorChannel::new(DeviceId::new("esp32-a").unwrap(), 5, ActuatorKind::Pump)
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn claim(source: SourceKind, on: bool, ts: Timestamp) -> ControlClaim {
        ControlClaim::new(pump(), source, DesiredState::Binary(on), "test", ts)
    }

    fn registry() -> SourceRegistry {
        let registry = SourceRegistry::new();
        registry.register_channel(pump());
        registry
    }

    #[test]
    fn should_store_one_claim_per_source() {
        let registry = registry();
        registry
            .submit(claim(SourceKind::Manual, true, at(0)))
            .unwrap();
        registry
            .submit(claim(SourceKind::Manual, false, at(1)))
            .unwrap();
        registry
            .submit(claim(SourceKind::Logic, true, at(1)))
            .unwrap();

        let claims = registry.claims(&pump().id, at(2));
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].source, SourceKind::Manual);
        assert_eq!(claims[0].desired_state, DesiredState::Binary(false));
    }

    #[test]
    fn should_reject_unknown_channel() {
        let registry = SourceRegistry::new();
        let result = registry.submit(claim(SourceKind::Manual, true, at(0)));
        assert!(matches!(result, Err(ClaimError::UnknownChannel(_))));
    }

    #[test]
    fn should_reject_default_source() {
        let result = registry().submit(claim(SourceKind::Default, true, at(0)));
        assert!(matches!(
            result,
            Err(ClaimError::InvalidState(ValidationError::ReservedSource(_)))
        ));
    }

    #[test]
    fn should_reject_level_on_binary_actuator() {
        let mut level = claim(SourceKind::Manual, true, at(0));
        level.desired_state = DesiredState::Level(40);
        let result = registry().submit(level);
        assert!(matches!(result, Err(ClaimError::InvalidState(_))));
    }

    #[test]
    fn should_reject_kind_mismatch() {
        let mut wrong = claim(SourceKind::Manual, true, at(0));
        wrong.channel.kind = ActuatorKind::Valve;
        let result = registry().submit(wrong);
        assert!(matches!(result, Err(ClaimError::KindMismatch { .. })));
    }

    #[test]
    fn should_reject_claim_older_than_stored_one() {
        let registry = registry();
        registry
            .submit(claim(SourceKind::Alert, true, at(10)))
            .unwrap();
        let result = registry.submit(claim(SourceKind::Alert, false, at(5)));
        assert!(matches!(result, Err(ClaimError::StaleClaim { .. })));
        assert_eq!(
            registry.claims(&pump().id, at(11))[0].desired_state,
            DesiredState::Binary(true)
        );
    }

    #[test]
    fn should_accept_older_claim_once_stored_one_expired() {
        let registry = registry();
        let short = claim(SourceKind::Alert, true, at(10)).expires_after(Duration::seconds(1));
        registry.submit(short).unwrap();
        let late = claim(SourceKind::Alert, false, at(5));
        // the stored claim is still live at the late claim's own timestamp
        assert!(registry.submit(late.clone()).is_err());
        registry.claims(&pump().id, at(20));
        assert!(registry.submit(late).is_ok());
    }

    #[test]
    fn should_prune_expired_claims_on_read() {
        let registry = registry();
        let expiring = claim(SourceKind::Emergency, true, at(0))
            .expires_after(Duration::seconds(30));
        registry.submit(expiring).unwrap();
        assert_eq!(registry.claims(&pump().id, at(29)).len(), 1);
        assert!(registry.claims(&pump().id, at(30)).is_empty());
    }

    #[test]
    fn should_withdraw_claim() {
        let registry = registry();
        registry
            .submit(claim(SourceKind::Timer, true, at(0)))
            .unwrap();
        assert!(registry.withdraw(&pump().id, SourceKind::Timer).is_some());
        assert!(registry.withdraw(&pump().id, SourceKind::Timer).is_none());
        assert!(registry.claims(&pump().id, at(1)).is_empty());
    }

    #[test]
    fn should_drop_claims_when_unregistered() {
        let registry = registry();
        registry
            .submit(claim(SourceKind::Manual, true, at(0)))
            .unwrap();
        assert!(registry.unregister_channel(&pump().id));
        assert!(registry.claims(&pump().id, at(1)).is_empty());
        assert!(registry.channels().is_empty());
    }
}
