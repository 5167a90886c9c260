//! `SQLite` implementation of [`AuditSink`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::AuditSink;
use greenhub_domain::audit::AuditLogEntry;
use greenhub_domain::channel::{ChannelId, DesiredState};
use greenhub_domain::error::GreenhubError;
use greenhub_domain::id::AuditEntryId;

use crate::error::StorageError;
use crate::row::{decode_channel, decode_json, decode_parsed, decode_timestamp, encode_timestamp};

struct Wrapper(AuditLogEntry);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let device_id: String = row.try_get("device_id")?;
        let gpio: i64 = row.try_get("gpio")?;
        let event_type: String = row.try_get("event_type")?;
        let prior_source: Option<String> = row.try_get("prior_source")?;
        let new_source: String = row.try_get("new_source")?;
        let prior_state: Option<String> = row.try_get("prior_state")?;
        let new_state: String = row.try_get("new_state")?;
        let trigger_reason: String = row.try_get("trigger_reason")?;
        let timestamp: String = row.try_get("timestamp")?;

        Ok(Self(AuditLogEntry {
            id: AuditEntryId::from_uuid(id),
            channel: decode_channel(device_id, gpio)?,
            event_type: decode_parsed(&event_type)?,
            prior_source: prior_source.as_deref().map(decode_parsed).transpose()?,
            new_source: decode_parsed(&new_source)?,
            prior_state: prior_state.as_deref().map(decode_json).transpose()?,
            new_state: decode_json(&new_state)?,
            trigger_reason,
            timestamp: decode_timestamp(&timestamp)?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO audit_log (id, device_id, gpio, event_type, prior_source, new_source, prior_state, new_state, trigger_reason, timestamp)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const SELECT_RECENT: &str = "SELECT * FROM audit_log ORDER BY timestamp DESC, rowid DESC LIMIT ?";
const SELECT_RECENT_BY_CHANNEL: &str = r"
    SELECT * FROM audit_log
    WHERE device_id = ? AND gpio = ?
    ORDER BY timestamp DESC, rowid DESC
    LIMIT ?
";

fn encode_state(state: DesiredState) -> Result<String, StorageError> {
    Ok(serde_json::to_string(&state)?)
}

/// `SQLite`-backed audit log.
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    /// Create a new audit log using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AuditSink for SqliteAuditLog {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), GreenhubError> {
        let prior_state = entry.prior_state.map(encode_state).transpose()?;
        let new_state = encode_state(entry.new_state)?;

        sqlx::query(INSERT)
            .bind(entry.id.as_uuid())
            .bind(entry.channel.device_id.as_str())
            .bind(i64::from(entry.channel.gpio))
            .bind(entry.event_type.as_str())
            .bind(entry.prior_source.map(|source| source.as_str()))
            .bind(entry.new_source.as_str())
            .bind(prior_state)
            .bind(new_state)
            .bind(&entry.trigger_reason)
            .bind(encode_timestamp(entry.timestamp))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn recent(
        &self,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, GreenhubError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<Wrapper> = match channel {
            Some(channel) => sqlx::query_as::<_, Wrapper>(SELECT_RECENT_BY_CHANNEL)
                .bind(channel.device_id.as_str())
                .bind(i64::from(channel.gpio))
                .bind(limit)
                .fetch_all(&self.pool)
                .await,
            None => {
                sqlx::query_as::<_, Wrapper>(SELECT_RECENT)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
