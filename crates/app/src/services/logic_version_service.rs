//! Logic version service: use-cases for saving, restoring, importing,
//! exporting and copying channel logic.

use std::sync::Arc;

use serde_json::Value;

use greenhub_domain::channel::{ActuatorChannel, ChannelId};
use greenhub_domain::error::{GreenhubError, NotFoundError};
use greenhub_domain::id::VersionId;
use greenhub_domain::logic::{
    AdaptOptions, LogicConfiguration, LogicDiff, LogicDocument, RepairReport, adapt,
};
use greenhub_domain::time;
use greenhub_domain::version::LogicVersion;

use crate::active_configs::ActiveConfigs;
use crate::ports::LogicVersionRepository;

/// Versions kept per channel when not configured otherwise.
pub const DEFAULT_MAX_VERSIONS: usize = 50;

/// Application service for versioned channel logic.
///
/// Every successful save also replaces the channel's entry in
/// [`ActiveConfigs`], which is what the evaluation loop reads.
pub struct LogicVersionService<R> {
    repo: R,
    configs: Arc<ActiveConfigs>,
    max_versions: usize,
}

impl<R: LogicVersionRepository> LogicVersionService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R, configs: Arc<ActiveConfigs>, max_versions: usize) -> Self {
        Self {
            repo,
            configs,
            max_versions: max_versions.max(1),
        }
    }

    /// Load the newest version of every channel into the active set.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn load_active(&self) -> Result<usize, GreenhubError> {
        let latest = self.repo.list_latest().await?;
        let count = latest.len();
        for version in latest {
            self.configs.set(version.channel.id, version.config);
        }
        tracing::info!(count, "active logic loaded");
        Ok(count)
    }

    /// Save `config` as the channel's new logic.
    ///
    /// A configuration identical to the latest version is not stored again;
    /// the latest version is returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::Validation`] if the configuration does not
    /// fit the channel, or a storage error from the repository.
    #[tracing::instrument(skip(self, channel, config), fields(channel = %channel.id))]
    pub async fn save(
        &self,
        channel: &ActuatorChannel,
        config: LogicConfiguration,
        author: &str,
        reason: Option<String>,
    ) -> Result<LogicVersion, GreenhubError> {
        config.validate(channel.kind)?;
        let latest = self.repo.latest(channel.id.clone()).await?;
        if let Some(latest) = latest
            && LogicDiff::between(Some(&latest.config), &config).is_empty()
        {
            tracing::debug!(version = %latest.id, "configuration unchanged");
            self.configs.set(channel.id.clone(), latest.config.clone());
            return Ok(latest);
        }
        self.append(channel, config, author, reason).await
    }

    /// All versions of a channel, newest-first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn history(
        &self,
        channel: &ChannelId,
    ) -> Result<Vec<LogicVersion>, GreenhubError> {
        self.repo.list_for_channel(channel.clone()).await
    }

    /// The configuration the channel is currently evaluated with.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn active(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<LogicConfiguration>, GreenhubError> {
        if let Some(config) = self.configs.get(channel) {
            return Ok(Some(config));
        }
        Ok(self
            .repo
            .latest(channel.clone())
            .await?
            .map(|version| version.config))
    }

    /// Make a historical version current again by saving it as a new
    /// version.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::NotFound`] when the version does not exist
    /// or belongs to another channel, or a storage error.
    #[tracing::instrument(skip(self, channel), fields(channel = %channel.id))]
    pub async fn restore(
        &self,
        channel: &ActuatorChannel,
        version_id: VersionId,
        author: &str,
    ) -> Result<LogicConfiguration, GreenhubError> {
        let version = self
            .repo
            .get_by_id(version_id)
            .await?
            .filter(|version| version.channel.id == channel.id)
            .ok_or_else(|| NotFoundError {
                entity: "LogicVersion",
                id: version_id.to_string(),
            })?;
        let summary = format!("restored from {version_id}");
        let restored = self
            .append(channel, version.config, author, Some(summary))
            .await?;
        Ok(restored.config)
    }

    /// Export the channel's current logic.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::NotFound`] when the channel has no saved
    /// logic, or a storage error.
    pub async fn export_schema(
        &self,
        channel: &ActuatorChannel,
    ) -> Result<LogicDocument, GreenhubError> {
        let latest = self.latest_or_not_found(channel).await?;
        Ok(latest.to_document(
            channel.to_string(),
            latest.change_summary.clone(),
        ))
    }

    /// Strictly import a document onto `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::Schema`] listing every offending field;
    /// nothing is saved in that case.
    #[tracing::instrument(skip(self, document, target), fields(channel = %target.id))]
    pub async fn import_schema(
        &self,
        document: &Value,
        target: &ActuatorChannel,
        author: &str,
    ) -> Result<LogicVersion, GreenhubError> {
        let config = LogicDocument::parse(document, target).inspect_err(|err| {
            tracing::warn!(issues = err.issues.len(), "document rejected");
        })?;
        self.save(
            target,
            config,
            author,
            Some("imported document".to_string()),
        )
        .await
    }

    /// Preview a lenient import of a possibly damaged document. Nothing is
    /// saved; pass the report to [`apply_repair`](Self::apply_repair) to
    /// accept it.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::Schema`] when nothing can be salvaged.
    pub fn import_with_repair(
        &self,
        document: &Value,
        target: &ActuatorChannel,
    ) -> Result<RepairReport, GreenhubError> {
        let report = LogicDocument::parse_with_repair(document, target)?;
        for warning in report.warnings() {
            tracing::info!(channel = %target.id, %warning, "document repaired");
        }
        Ok(report)
    }

    /// Save a previewed repair.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::Validation`] if the repaired configuration
    /// does not fit `target`, or a storage error.
    pub async fn apply_repair(
        &self,
        report: RepairReport,
        target: &ActuatorChannel,
        author: &str,
    ) -> Result<LogicVersion, GreenhubError> {
        let summary = match report.warnings().len() {
            0 => "imported document".to_string(),
            n => format!("imported document with {n} repairs"),
        };
        self.save(target, report.into_configuration(), author, Some(summary))
            .await
    }

    /// Copy the logic of `source` onto `target`, remapping sensor
    /// references to the target device.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhubError::NotFound`] when `source` has no saved logic,
    /// [`GreenhubError::Adaptation`] listing every reference that could not
    /// be remapped, or a storage error.
    #[tracing::instrument(
        skip(self, source, target, options),
        fields(source = %source.id, target = %target.id)
    )]
    pub async fn copy_and_adapt(
        &self,
        source: &ActuatorChannel,
        target: &ActuatorChannel,
        options: &AdaptOptions,
        author: &str,
    ) -> Result<LogicVersion, GreenhubError> {
        let latest = self.latest_or_not_found(source).await?;
        let adapted = adapt(&latest.config, source, target, options)?;
        self.save(
            target,
            adapted,
            author,
            Some(format!("copied from {}", source.id)),
        )
        .await
    }

    async fn latest_or_not_found(
        &self,
        channel: &ActuatorChannel,
    ) -> Result<LogicVersion, GreenhubError> {
        self.repo.latest(channel.id.clone()).await?.ok_or_else(|| {
            NotFoundError {
                entity: "LogicVersion",
                id: channel.id.to_string(),
            }
            .into()
        })
    }

    async fn append(
        &self,
        channel: &ActuatorChannel,
        config: LogicConfiguration,
        author: &str,
        summary: Option<String>,
    ) -> Result<LogicVersion, GreenhubError> {
        let previous = self.repo.latest(channel.id.clone()).await?;
        let version = LogicVersion::record(
            channel.clone(),
            config,
            previous.as_ref(),
            author,
            summary,
            time::now(),
        );
        let version = self.repo.append(version).await?;
        let pruned = self
            .repo
            .prune(channel.id.clone(), self.max_versions)
            .await?;
        self.configs.set(channel.id.clone(), version.config.clone());
        tracing::info!(
            version = %version.id,
            summary = %version.change_summary,
            pruned,
            "logic version saved"
        );
        Ok(version)
    }
}
