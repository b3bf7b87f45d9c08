use std::sync::Arc;

use gateway_core::{GatewayResult, Message, Role, Session};
use gateway_storage::SessionStore;
use log::debug;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::facade::{MemoryContext, MemoryFacade};

/// Per-session ordered message log plus memory-augmented prompt
/// construction (C5, spec §4.4).
///
/// The leading system message is held as mutable per-session state here
/// rather than in the immutable `messages` log `gateway-storage` persists:
/// spec's "`set_system` replaces or inserts a leading system message"
/// cannot be reconciled with "messages are immutable once written" any
/// other way, so the system text is a plain field `set_system` overwrites
/// and `dialogue()` prepends at read time (see DESIGN.md).
pub struct DialogueSession {
    session_id: Uuid,
    device_id: String,
    user_id: Option<String>,
    store: Arc<SessionStore>,
    memory: Arc<dyn MemoryFacade>,
    memory_enabled: bool,
    system_message: Mutex<Option<String>>,
    write_lock: Mutex<()>,
}

impl DialogueSession {
    pub fn new(
        session: &Session,
        store: Arc<SessionStore>,
        memory: Arc<dyn MemoryFacade>,
        memory_enabled: bool,
    ) -> Self {
        Self {
            session_id: session.session_id,
            device_id: session.device_id.clone(),
            user_id: session.user_id.clone(),
            store,
            memory,
            memory_enabled,
            system_message: Mutex::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Replaces (or inserts, if absent) the leading system message.
    pub async fn set_system(&self, text: impl Into<String>) {
        *self.system_message.lock().await = Some(text.into());
    }

    /// Appends `message` and, if memory is enabled, schedules async
    /// extraction over the resulting snapshot. Extraction is fire-and-forget
    /// from the caller's perspective: `memory.save` enqueues onto the
    /// bounded worker pool and returns immediately.
    pub async fn put(&self, message: Message) -> GatewayResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.append_message(message).await?;
        if self.memory_enabled {
            let snapshot = self.store.dialogue(self.session_id).await?;
            let ctx = MemoryContext {
                user_id: self.user_id.clone(),
                device_id: self.device_id.clone(),
                session_id: self.session_id,
            };
            self.memory.save(ctx, snapshot).await;
        }
        Ok(())
    }

    /// Full ordered history: the current system message (if any) followed
    /// by the persisted log in append order.
    pub async fn dialogue(&self) -> GatewayResult<Vec<Message>> {
        let _guard = self.write_lock.lock().await;
        let mut out = Vec::new();
        if let Some(text) = self.system_message.lock().await.clone() {
            out.push(Message::new(self.session_id, Role::System, text));
        }
        out.extend(self.store.dialogue(self.session_id).await?);
        Ok(out)
    }

    /// Same as `dialogue()`, additionally prepended with a synthesized
    /// system message carrying recalled memory lines, per spec §4.4. Falls
    /// back to the most recent user message when `query` is empty, and
    /// further falls back to plain `dialogue()` when no user message exists
    /// or nothing is recalled.
    pub async fn dialogue_with_memory(&self, query: Option<&str>) -> GatewayResult<Vec<Message>> {
        let base = self.dialogue().await?;
        let effective_query = match query {
            Some(q) if !q.trim().is_empty() => Some(q.to_string()),
            _ => base
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone()),
        };
        let Some(query_text) = effective_query else {
            return Ok(base);
        };
        let recalled = self
            .memory
            .query(self.user_id.as_deref(), &self.device_id, &query_text, None)
            .await?;
        if recalled.is_empty() {
            return Ok(base);
        }
        let mut out = Vec::with_capacity(base.len() + 1);
        out.push(Message::new(
            self.session_id,
            Role::System,
            format!("Relevant memory:\n{recalled}"),
        ));
        out.extend(base);
        Ok(out)
    }

    /// Empties the persisted log and the local system message, then
    /// schedules an asynchronous purge of persisted memory for this
    /// session.
    pub async fn clear(&self) -> GatewayResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.clear_dialogue(self.session_id).await?;
        *self.system_message.lock().await = None;
        debug!("scheduling memory purge for session {}", self.session_id);
        self.memory.clear(self.session_id).await;
        Ok(())
    }
}
