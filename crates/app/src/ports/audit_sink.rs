//! Audit sink port: durable record of decision transitions.

use std::future::Future;

use greenhub_domain::audit::AuditLogEntry;
use greenhub_domain::channel::ChannelId;
use greenhub_domain::error::GreenhubError;

/// Stores [`AuditLogEntry`]s.
pub trait AuditSink {
    /// Persist an entry.
    fn append(
        &self,
        entry: AuditLogEntry,
    ) -> impl Future<Output = Result<(), GreenhubError>> + Send;

    /// Most recent entries, newest-first, optionally for one channel.
    fn recent(
        &self,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AuditLogEntry>, GreenhubError>> + Send;
}

impl<T: AuditSink + Send + Sync> AuditSink for std::sync::Arc<T> {
    fn append(
        &self,
        entry: AuditLogEntry,
    ) -> impl Future<Output = Result<(), GreenhubError>> + Send {
        (**self).append(entry)
    }

    fn recent(
        &self,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AuditLogEntry>, GreenhubError>> + Send {
        (**self).recent(channel, limit)
    }
}
