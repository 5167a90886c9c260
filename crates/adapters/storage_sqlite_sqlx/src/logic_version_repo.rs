//! `SQLite` implementation of [`LogicVersionRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::LogicVersionRepository;
use greenhub_domain::channel::{ActuatorChannel, ActuatorKind, ChannelId};
use greenhub_domain::error::GreenhubError;
use greenhub_domain::id::VersionId;
use greenhub_domain::version::LogicVersion;

use crate::error::StorageError;
use crate::row::{decode_channel, decode_json, decode_parsed, decode_timestamp, encode_timestamp};

struct Wrapper(LogicVersion);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<LogicVersion> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let version_id: uuid::Uuid = row.try_get("id")?;
        let device_id: String = row.try_get("device_id")?;
        let gpio: i64 = row.try_get("gpio")?;
        let kind: String = row.try_get("actuator_kind")?;
        let config: String = row.try_get("config")?;
        let saved_at: String = row.try_get("saved_at")?;
        let author: String = row.try_get("author")?;
        let change_summary: String = row.try_get("change_summary")?;
        let diff: String = row.try_get("diff")?;

        let kind: ActuatorKind = decode_parsed(&kind)?;

        Ok(Self(LogicVersion {
            id: VersionId::from_uuid(version_id),
            channel: ActuatorChannel {
                id: decode_channel(device_id, gpio)?,
                kind,
            },
            config: decode_json(&config)?,
            saved_at: decode_timestamp(&saved_at)?,
            author,
            change_summary,
            diff: decode_json(&diff)?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO logic_versions (id, device_id, gpio, actuator_kind, config, saved_at, author, change_summary, diff)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const SELECT_BY_ID: &str = "SELECT * FROM logic_versions WHERE id = ?";
const SELECT_LATEST: &str = r"
    SELECT * FROM logic_versions
    WHERE device_id = ? AND gpio = ?
    ORDER BY saved_at DESC
    LIMIT 1
";
const SELECT_BY_CHANNEL: &str = r"
    SELECT * FROM logic_versions
    WHERE device_id = ? AND gpio = ?
    ORDER BY saved_at DESC
";
const SELECT_LATEST_PER_CHANNEL: &str = r"
    SELECT v.* FROM logic_versions v
    WHERE v.saved_at = (
        SELECT MAX(w.saved_at) FROM logic_versions w
        WHERE w.device_id = v.device_id AND w.gpio = v.gpio
    )
    ORDER BY v.device_id, v.gpio
";
const PRUNE: &str = r"
    DELETE FROM logic_versions
    WHERE device_id = ? AND gpio = ? AND id NOT IN (
        SELECT id FROM logic_versions
        WHERE device_id = ? AND gpio = ?
        ORDER BY saved_at DESC
        LIMIT ?
    )
";

/// `SQLite`-backed logic version history.
pub struct SqliteLogicVersionRepository {
    pool: SqlitePool,
}

impl SqliteLogicVersionRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl LogicVersionRepository for SqliteLogicVersionRepository {
    async fn append(&self, version: LogicVersion) -> Result<LogicVersion, GreenhubError> {
        let config = serde_json::to_string(&version.config).map_err(StorageError::from)?;
        let diff = serde_json::to_string(&version.diff).map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(version.id.as_uuid())
            .bind(version.channel.id.device_id.as_str())
            .bind(i64::from(version.channel.id.gpio))
            .bind(version.channel.kind.as_str())
            .bind(&config)
            .bind(encode_timestamp(version.saved_at))
            .bind(&version.author)
            .bind(&version.change_summary)
            .bind(&diff)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(version)
    }

    async fn latest(&self, channel: ChannelId) -> Result<Option<LogicVersion>, GreenhubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_LATEST)
            .bind(channel.device_id.as_str())
            .bind(i64::from(channel.gpio))
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn get_by_id(&self, id: VersionId) -> Result<Option<LogicVersion>, GreenhubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn list_for_channel(
        &self,
        channel: ChannelId,
    ) -> Result<Vec<LogicVersion>, GreenhubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_CHANNEL)
            .bind(channel.device_id.as_str())
            .bind(i64::from(channel.gpio))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn prune(&self, channel: ChannelId, keep: usize) -> Result<usize, GreenhubError> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let result = sqlx::query(PRUNE)
            .bind(channel.device_id.as_str())
            .bind(i64::from(channel.gpio))
            .bind(channel.device_id.as_str())
            .bind(i64::from(channel.gpio))
            .bind(keep)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn list_latest(&self) -> Result<Vec<LogicVersion>, GreenhubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_LATEST_PER_CHANNEL)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
