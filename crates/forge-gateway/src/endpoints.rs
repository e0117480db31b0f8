//! Shared endpoint constant definitions for the gateway router.

pub(crate) const HEALTH_ENDPOINT: &str = "/health";
pub(crate) const SESSIONS_ENDPOINT: &str = "/sessions";
pub(crate) const SESSION_DETAIL_ENDPOINT: &str = "/sessions/{session_id}";
pub(crate) const SESSION_PROMPT_ENDPOINT: &str = "/sessions/{session_id}/prompt";
pub(crate) const SESSION_RESPONSE_ENDPOINT: &str = "/sessions/{session_id}/response";
pub(crate) const SESSION_TRACE_ENDPOINT: &str = "/sessions/{session_id}/trace";
pub(crate) const SESSION_TRACE_JSONL_ENDPOINT: &str = "/sessions/{session_id}/trace.jsonl";
pub(crate) const EXECUTE_ENDPOINT: &str = "/api/execute";
pub(crate) const GITHUB_WEBHOOK_ENDPOINT: &str = "/webhooks/github";
pub(crate) const DISCORD_WEBHOOK_ENDPOINT: &str = "/webhooks/discord";
