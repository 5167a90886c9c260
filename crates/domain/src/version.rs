//! Logic version: an immutable snapshot of a channel's configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::channel::ActuatorChannel;
use crate::id::VersionId;
use crate::logic::{DocumentMetadata, LogicConfiguration, LogicDiff, LogicDocument};
use crate::time::Timestamp;

/// One saved revision. Versions of a channel are append-only and ordered by
/// `saved_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicVersion {
    pub id: VersionId,
    pub channel: ActuatorChannel,
    pub config: LogicConfiguration,
    pub saved_at: Timestamp,
    pub author: String,
    pub change_summary: String,
    /// Changes relative to the previous version of the channel.
    pub diff: LogicDiff,
}

impl LogicVersion {
    /// Record `config` as the revision following `previous`.
    ///
    /// `saved_at` is kept strictly after the previous version even if the
    /// clock stepped backwards. Without a `summary` the diff summary is used.
    #[must_use]
    pub fn record(
        channel: ActuatorChannel,
        config: LogicConfiguration,
        previous: Option<&Self>,
        author: impl Into<String>,
        summary: Option<String>,
        now: Timestamp,
    ) -> Self {
        let diff = LogicDiff::between(previous.map(|prev| &prev.config), &config);
        let saved_at = match previous {
            Some(prev) if now <= prev.saved_at => prev.saved_at + Duration::milliseconds(1),
            _ => now,
        };
        Self {
            id: VersionId::new(),
            channel,
            config,
            saved_at,
            author: author.into(),
            change_summary: summary.unwrap_or_else(|| diff.summary()),
            diff,
        }
    }

    /// Export this revision as a document.
    #[must_use]
    pub fn to_document(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> LogicDocument {
        LogicDocument::from_configuration(
            &self.channel,
            &self.config,
            DocumentMetadata {
                name: name.into(),
                description: description.into(),
                created_by: self.author.clone(),
                last_modified: Some(self.saved_at),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ActuatorKind, DesiredState};
    use crate::id::DeviceId;
    use chrono::{TimeZone, Utc};

    fn pump() -> ActuatorChannel {
        ActuatorChannel::new(DeviceId::new("esp32-a").unwrap(), 5, ActuatorKind::Pump)
    }

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn should_summarize_diff_when_no_reason_given() {
        let first = LogicVersion::record(
            pump(),
            LogicConfiguration::default(),
            None,
            "ana",
            None,
            at(0),
        );
        assert_eq!(first.change_summary, "no changes");

        let next_config = LogicConfiguration {
            failsafe_state: Some(DesiredState::Binary(false)),
            ..LogicConfiguration::default()
        };
        let second = LogicVersion::record(pump(), next_config, Some(&first), "ana", None, at(5));
        assert_eq!(second.change_summary, "failsafe_state changed");
        assert_eq!(second.saved_at, at(5));
    }

    #[test]
    fn should_keep_saved_at_monotonic_when_clock_steps_back() {
        let first = LogicVersion::record(
            pump(),
            LogicConfiguration::default(),
            None,
            "ana",
            None,
            at(10),
        );
        let second = LogicVersion::record(
            pump(),
            LogicConfiguration::default(),
            Some(&first),
            "ana",
            Some("restored".to_string()),
            at(3),
        );
        assert!(second.saved_at > first.saved_at);
        assert_eq!(second.change_summary, "restored");
    }

    #[test]
    fn should_export_document_with_author_metadata() {
        let version = LogicVersion::record(
            pump(),
            LogicConfiguration::default(),
            None,
            "ana",
            None,
            at(0),
        );
        let doc = version.to_document("pump logic", "");
        assert_eq!(doc.metadata.created_by, "ana");
        assert_eq!(doc.metadata.last_modified, Some(at(0)));
        assert_eq!(doc.actuator.kind, ActuatorKind::Pump);
    }
}
