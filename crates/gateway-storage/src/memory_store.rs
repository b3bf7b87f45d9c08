use std::str::FromStr;

use anyhow::anyhow;
use chrono::Utc;
use gateway_core::{GatewayError, GatewayResult, MemoryRecord, MemoryType};
use rusqlite::params;
use tokio_rusqlite::Connection;
use uuid::Uuid;

/// Memory record persistence: insert-only from extractors, read/updated by
/// recall (spec §3, §4.4).
#[derive(Clone)]
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, record: MemoryRecord) -> GatewayResult<()> {
        record.validate()?;
        let tags_json = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".into());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO memories
                        (id, user_id, device_id, session_id, memory_type, content, importance, tags, use_count, last_used, is_active)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        record.id.to_string(),
                        record.user_id,
                        record.device_id,
                        record.session_id.to_string(),
                        record.memory_type.to_string(),
                        record.content,
                        record.importance,
                        tags_json,
                        record.use_count,
                        record.last_used.map(|t| t.to_rfc3339()),
                        record.is_active,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Fetches up to `limit` active records scoped to `(user_id?, device_id)`
    /// ordered by `importance DESC, last_used DESC, use_count DESC`, per
    /// spec §4.4 `query_memory` step 2.
    pub async fn fetch_for_recall(
        &self,
        user_id: Option<String>,
        device_id: String,
        limit: usize,
    ) -> GatewayResult<Vec<MemoryRecord>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, device_id, session_id, memory_type, content, importance, tags, use_count, last_used, is_active
                     FROM memories
                     WHERE device_id = ?1 AND is_active = 1
                       AND (?2 IS NULL OR user_id = ?2)
                     ORDER BY importance DESC, last_used DESC, use_count DESC
                     LIMIT ?3",
                )?;
                let mut rows = stmt.query(params![device_id, user_id, limit as i64])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_memory(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Increments `use_count` and sets `last_used = now` for the given
    /// records, per spec §4.4 `query_memory` step 3.
    pub async fn mark_used(&self, ids: Vec<Uuid>) -> GatewayResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for id in &ids {
                    tx.execute(
                        "UPDATE memories SET use_count = use_count + 1, last_used = ?2 WHERE id = ?1",
                        params![id.to_string(), now],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Soft-deletes (marks inactive) all memory for a session; used by
    /// `clear()`. Records are insert-only, so purge never physically
    /// deletes rows — it only makes them invisible to recall.
    pub async fn purge_session(&self, session_id: Uuid) -> GatewayResult<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE memories SET is_active = 0 WHERE session_id = ?1",
                    params![session_id.to_string()],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(3)?;
    let memory_type: String = row.get(4)?;
    let tags_raw: String = row.get(7)?;
    let last_used: Option<String> = row.get(9)?;
    Ok(MemoryRecord {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1)?,
        device_id: row.get(2)?,
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        memory_type: MemoryType::from_str(&memory_type).unwrap_or(MemoryType::Conversation),
        content: row.get(5)?,
        importance: row.get(6)?,
        tags: serde_json::from_str(&tags_raw).unwrap_or_default(),
        use_count: row.get(8)?,
        last_used: last_used.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&chrono::Utc))
        }),
        is_active: row.get(10)?,
    })
}
