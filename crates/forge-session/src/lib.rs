//! Durable, file-backed persistence for execution sessions.
//!
//! One directory per session holds `metadata.json` plus optional `prompt.txt`,
//! `response.txt`, `trace.html`, and `trace.jsonl` artifacts. The session id
//! doubles as the storage path segment, so every accessor validates the fixed
//! hex-id shape before touching the filesystem.

mod session_store;
mod store_cleanup;

pub use session_store::{
    generate_session_id, validate_session_id, SessionMetadata, SessionRecord, SessionStore,
};
pub use store_cleanup::spawn_cleanup_task;
