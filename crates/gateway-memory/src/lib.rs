//! The Dialogue & Memory Core (C5): a per-session ordered message log,
//! asynchronous memory extraction, and keyword-based recall that can be
//! injected back into a prompt (spec §4.4).
//!
//! Grounded on the teacher's `fluent-agent::memory` working-memory log
//! (ordered `Vec<Message>` behind a lock) and cross-session persistence of
//! extracted facts, generalized to this crate's storage-backed
//! `SessionStore`/`MemoryStore` and a bounded worker pool for extraction
//! instead of the teacher's multi-tier in-process memory system.

pub mod extraction;
pub mod facade;
pub mod keywords;
pub mod session;
pub mod worker;

pub use facade::{DefaultMemoryFacade, MemoryContext, MemoryFacade};
pub use session::DialogueSession;
pub use worker::WorkerPool;
