use std::str::FromStr;

use anyhow::anyhow;
use gateway_core::{GatewayError, GatewayResult, Message, Role, Session, SessionStatus, ToolCall};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use uuid::Uuid;

/// Session/message persistence backing `gateway-memory`'s dialogue log.
/// Messages are immutable once written (spec §3); `append_message` is the
/// only write path and assigns the next sequence number under the same
/// connection so concurrent appends to distinct sessions never collide.
#[derive(Clone)]
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn create_session(&self, device_id: String, user_id: Option<String>) -> GatewayResult<Session> {
        let session_id = Uuid::new_v4();
        let start_time = chrono::Utc::now();
        let status = SessionStatus::Active;
        self.conn
            .call({
                let device_id = device_id.clone();
                let user_id = user_id.clone();
                move |conn| {
                    conn.execute(
                        "INSERT INTO sessions (session_id, device_id, user_id, start_time, status, message_count, end_time)
                         VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)",
                        params![
                            session_id.to_string(),
                            device_id,
                            user_id,
                            start_time.to_rfc3339(),
                            status.to_string(),
                        ],
                    )?;
                    Ok(())
                }
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))?;
        Ok(Session {
            session_id,
            device_id,
            user_id,
            start_time,
            status,
            message_count: 0,
            end_time: None,
        })
    }

    pub async fn get_session(&self, session_id: Uuid) -> GatewayResult<Option<Session>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT session_id, device_id, user_id, start_time, status, message_count, end_time
                     FROM sessions WHERE session_id = ?1",
                    params![session_id.to_string()],
                    row_to_session,
                )
                .optional()
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn close_session(&self, session_id: Uuid, status: SessionStatus) -> GatewayResult<()> {
        let end_time = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE sessions SET status = ?2, end_time = ?3 WHERE session_id = ?1",
                    params![session_id.to_string(), status.to_string(), end_time],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Appends a message and bumps `message_count` in one transaction, so
    /// `dialogue()` readers never observe a message without the matching
    /// count update.
    pub async fn append_message(&self, message: Message) -> GatewayResult<()> {
        let tool_calls_json = serde_json::to_string(&message.tool_calls).unwrap_or_else(|_| "[]".into());
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let next_seq: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE session_id = ?1",
                    params![message.session_id.to_string()],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO messages (session_id, seq, role, content, timestamp, tool_call_id, tool_calls)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        message.session_id.to_string(),
                        next_seq,
                        message.role.to_string(),
                        message.content,
                        message.timestamp.to_rfc3339(),
                        message.tool_call_id,
                        tool_calls_json,
                    ],
                )?;
                tx.execute(
                    "UPDATE sessions SET message_count = message_count + 1 WHERE session_id = ?1",
                    params![message.session_id.to_string()],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn dialogue(&self, session_id: Uuid) -> GatewayResult<Vec<Message>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT session_id, role, content, timestamp, tool_call_id, tool_calls
                     FROM messages WHERE session_id = ?1 ORDER BY seq ASC",
                )?;
                let mut rows = stmt.query(params![session_id.to_string()])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_message(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Deletes all messages for a session and resets its count; used by
    /// `clear()`. Does not delete the session row itself.
    pub async fn clear_dialogue(&self, session_id: Uuid) -> GatewayResult<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM messages WHERE session_id = ?1",
                    params![session_id.to_string()],
                )?;
                tx.execute(
                    "UPDATE sessions SET message_count = 0 WHERE session_id = ?1",
                    params![session_id.to_string()],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let session_id: String = row.get(0)?;
    let start_time: String = row.get(3)?;
    let status: String = row.get(4)?;
    let end_time: Option<String> = row.get(6)?;
    Ok(Session {
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        device_id: row.get(1)?,
        user_id: row.get(2)?,
        start_time: chrono::DateTime::parse_from_rfc3339(&start_time)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        status: SessionStatus::from_str(&status).unwrap_or(SessionStatus::Active),
        message_count: row.get(5)?,
        end_time: end_time.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&chrono::Utc))
        }),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let session_id: String = row.get(0)?;
    let role: String = row.get(1)?;
    let timestamp: String = row.get(3)?;
    let tool_calls_raw: String = row.get(5)?;
    let tool_calls: Vec<ToolCall> = serde_json::from_str(&tool_calls_raw).unwrap_or_default();
    Ok(Message {
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        role: Role::from_str(&role).unwrap_or(Role::User),
        content: row.get(2)?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        tool_call_id: row.get(4)?,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_store() -> SessionStore {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| {
            conn.execute_batch(crate::schema::SCHEMA_SQL)?;
            Ok(())
        })
        .await
        .unwrap();
        SessionStore::new(conn)
    }

    #[tokio::test]
    async fn append_then_dialogue_observes_message_at_last_position() {
        let store = open_test_store().await;
        let session = store.create_session("d1".into(), None).await.unwrap();
        store
            .append_message(Message::new(session.session_id, Role::User, "hello"))
            .await
            .unwrap();
        store
            .append_message(Message::new(session.session_id, Role::Assistant, "hi"))
            .await
            .unwrap();
        store
            .append_message(Message::new(session.session_id, Role::User, "how are you"))
            .await
            .unwrap();

        let dialogue = store.dialogue(session.session_id).await.unwrap();
        assert_eq!(dialogue.len(), 3);
        assert_eq!(dialogue.last().unwrap().content, "how are you");
    }

    #[tokio::test]
    async fn clear_dialogue_empties_log_and_resets_count() {
        let store = open_test_store().await;
        let session = store.create_session("d1".into(), None).await.unwrap();
        store
            .append_message(Message::new(session.session_id, Role::User, "hello"))
            .await
            .unwrap();
        store.clear_dialogue(session.session_id).await.unwrap();
        let dialogue = store.dialogue(session.session_id).await.unwrap();
        assert!(dialogue.is_empty());
        let refreshed = store.get_session(session.session_id).await.unwrap().unwrap();
        assert_eq!(refreshed.message_count, 0);
    }
}
