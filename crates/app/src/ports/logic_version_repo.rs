//! Logic version repository port: append-only history of channel logic.

use std::future::Future;

use greenhub_domain::channel::ChannelId;
use greenhub_domain::error::GreenhubError;
use greenhub_domain::id::VersionId;
use greenhub_domain::version::LogicVersion;

/// Repository for persisting and querying [`LogicVersion`]s.
///
/// Versions are never updated in place; the only removal is [`prune`].
///
/// [`prune`]: LogicVersionRepository::prune
pub trait LogicVersionRepository {
    /// Append a new version.
    fn append(
        &self,
        version: LogicVersion,
    ) -> impl Future<Output = Result<LogicVersion, GreenhubError>> + Send;

    /// Newest version of a channel.
    fn latest(
        &self,
        channel: ChannelId,
    ) -> impl Future<Output = Result<Option<LogicVersion>, GreenhubError>> + Send;

    /// Get a version by its unique identifier.
    fn get_by_id(
        &self,
        id: VersionId,
    ) -> impl Future<Output = Result<Option<LogicVersion>, GreenhubError>> + Send;

    /// All versions of a channel, ordered newest-first.
    fn list_for_channel(
        &self,
        channel: ChannelId,
    ) -> impl Future<Output = Result<Vec<LogicVersion>, GreenhubError>> + Send;

    /// Delete all but the `keep` newest versions of a channel, returning how
    /// many were removed.
    fn prune(
        &self,
        channel: ChannelId,
        keep: usize,
    ) -> impl Future<Output = Result<usize, GreenhubError>> + Send;

    /// The newest version of every channel.
    fn list_latest(&self) -> impl Future<Output = Result<Vec<LogicVersion>, GreenhubError>> + Send;
}
