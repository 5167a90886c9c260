//! In-memory audit sink, bounded to the most recent entries.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use greenhub_domain::audit::AuditLogEntry;
use greenhub_domain::channel::ChannelId;
use greenhub_domain::error::GreenhubError;

use crate::ports::AuditSink;

#[derive(Debug)]
pub struct InMemoryAuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditLogEntry>>,
}

impl InMemoryAuditLog {
    /// Keep at most `capacity` entries, dropping the oldest first.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(
        &self,
        entry: AuditLogEntry,
    ) -> impl Future<Output = Result<(), GreenhubError>> + Send {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        async { Ok(()) }
    }

    fn recent(
        &self,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AuditLogEntry>, GreenhubError>> + Send {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let result: Vec<_> = entries
            .iter()
            .rev()
            .filter(|entry| channel.as_ref().is_none_or(|id| entry.channel == *id))
            .take(limit)
            .cloned()
            .collect();
        async { Ok(result) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use greenhub_domain::audit::AuditEventType;
    use greenhub_domain::channel::{ActuatorChannel, ActuatorKind, DesiredState};
    use greenhub_domain::id::DeviceId;
    use greenhub_domain::resolution::{FailsafeReason, failsafe_decision};

    fn entry(gpio: u8) -> AuditLogEntry {
        let channel =
            ActuatorChannel::new(DeviceId::new("esp32-a").unwrap(), gpio, ActuatorKind::Pump);
        let decision = failsafe_decision(
            &channel,
            DesiredState::Binary(false),
            FailsafeReason::NoLiveClaim,
            Utc::now(),
        );
        AuditLogEntry::transition(None, &decision).unwrap()
    }

    #[tokio::test]
    async fn should_return_newest_entries_first() {
        let log = InMemoryAuditLog::new(10);
        log.append(entry(1)).await.unwrap();
        log.append(entry(2)).await.unwrap();
        let recent = log.recent(None, 10).await.unwrap();
        assert_eq!(recent[0].channel.gpio, 2);
        assert_eq!(recent[1].event_type, AuditEventType::FailsafeActivated);
    }

    #[tokio::test]
    async fn should_filter_by_channel_and_limit() {
        let log = InMemoryAuditLog::new(10);
        for gpio in [1, 2, 1, 1] {
            log.append(entry(gpio)).await.unwrap();
        }
        let only_one = entry(1).channel;
        assert_eq!(log.recent(Some(only_one), 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn should_drop_oldest_entry_when_full() {
        let log = InMemoryAuditLog::new(2);
        for gpio in [1, 2, 3] {
            log.append(entry(gpio)).await.unwrap();
        }
        let recent = log.recent(None, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].channel.gpio, 2);
    }
}
