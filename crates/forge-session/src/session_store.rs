use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use forge_core::{current_unix_timestamp_ms, write_text_atomic};
use serde::{Deserialize, Serialize};

pub(crate) const METADATA_FILE: &str = "metadata.json";
pub(crate) const PROMPT_FILE: &str = "prompt.txt";
pub(crate) const RESPONSE_FILE: &str = "response.txt";
pub(crate) const TRACE_HTML_FILE: &str = "trace.html";
pub(crate) const TRACE_JSONL_FILE: &str = "trace.jsonl";

const SESSION_ID_LEN: usize = 32;

/// Durable per-session metadata, written once at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMetadata {
    pub id: String,
    pub timestamp_unix_ms: u64,
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub is_pull_request: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl SessionMetadata {
    pub fn new(id: String, operation_id: String) -> Self {
        Self {
            id,
            timestamp_unix_ms: current_unix_timestamp_ms(),
            operation_id,
            repo_full_name: None,
            issue_number: None,
            is_pull_request: false,
            branch_name: None,
            operation_type: None,
            channel_id: None,
            user_id: None,
        }
    }
}

/// Metadata plus artifact presence flags for one stored session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub metadata: SessionMetadata,
    pub has_prompt: bool,
    pub has_response: bool,
    pub has_trace_html: bool,
    pub has_trace_jsonl: bool,
}

/// Allocates a fresh session id: 32 lowercase hex characters from a
/// version-4 UUID, usable directly as a directory name.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Rejects anything that is not exactly 32 lowercase hex characters. This is
/// the path-traversal boundary: no filesystem access may happen for an id
/// that fails here.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.len() != SESSION_ID_LEN
        || !id
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
    {
        bail!("invalid session id format");
    }
    Ok(())
}

/// File-system-backed store keyed by session id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    retention_days: u64,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>, retention_days: u64) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create sessions root {}", root.display()))?;
        Ok(Self {
            root,
            retention_days,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn retention_days(&self) -> u64 {
        self.retention_days
    }

    pub fn session_path(&self, id: &str) -> Result<PathBuf> {
        validate_session_id(id)?;
        Ok(self.root.join(id))
    }

    /// Creates the session directory and writes metadata atomically. The id
    /// inside `metadata` must already be format-valid.
    pub fn create_session(&self, metadata: &SessionMetadata) -> Result<PathBuf> {
        let dir = self.session_path(&metadata.id)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create session directory {}", dir.display()))?;
        let encoded = serde_json::to_string_pretty(metadata)
            .context("failed to encode session metadata")?;
        write_text_atomic(&dir.join(METADATA_FILE), &encoded)?;
        Ok(dir)
    }

    pub fn save_prompt(&self, id: &str, prompt: &str) -> Result<()> {
        self.save_artifact(id, PROMPT_FILE, prompt)
    }

    pub fn save_response(&self, id: &str, response: &str) -> Result<()> {
        self.save_artifact(id, RESPONSE_FILE, response)
    }

    pub fn save_trace_html(&self, id: &str, trace: &str) -> Result<()> {
        self.save_artifact(id, TRACE_HTML_FILE, trace)
    }

    pub fn save_trace_jsonl(&self, id: &str, trace: &str) -> Result<()> {
        self.save_artifact(id, TRACE_JSONL_FILE, trace)
    }

    fn save_artifact(&self, id: &str, file_name: &str, content: &str) -> Result<()> {
        let dir = self.session_path(id)?;
        if !dir.is_dir() {
            bail!("session '{id}' does not exist");
        }
        let path = dir.join(file_name);
        if path.exists() {
            bail!("artifact '{file_name}' already written for session '{id}'");
        }
        write_text_atomic(&path, content)
    }

    /// Returns metadata plus artifact presence, or `None` when the session
    /// directory is absent. A directory vanishing mid-read (cleanup racing a
    /// reader) is also `None`, never an error.
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let dir = self.session_path(id)?;
        let metadata_path = dir.join(METADATA_FILE);
        let raw = match std::fs::read_to_string(&metadata_path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to read session metadata {}", metadata_path.display())
                })
            }
        };
        let metadata: SessionMetadata = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse session metadata for '{id}'"))?;
        Ok(Some(SessionRecord {
            metadata,
            has_prompt: dir.join(PROMPT_FILE).is_file(),
            has_response: dir.join(RESPONSE_FILE).is_file(),
            has_trace_html: dir.join(TRACE_HTML_FILE).is_file(),
            has_trace_jsonl: dir.join(TRACE_JSONL_FILE).is_file(),
        }))
    }

    pub fn get_prompt(&self, id: &str) -> Result<Option<String>> {
        self.read_artifact(id, PROMPT_FILE)
    }

    pub fn get_response(&self, id: &str) -> Result<Option<String>> {
        self.read_artifact(id, RESPONSE_FILE)
    }

    pub fn get_trace_html(&self, id: &str) -> Result<Option<String>> {
        self.read_artifact(id, TRACE_HTML_FILE)
    }

    pub fn get_trace_jsonl(&self, id: &str) -> Result<Option<String>> {
        self.read_artifact(id, TRACE_JSONL_FILE)
    }

    fn read_artifact(&self, id: &str, file_name: &str) -> Result<Option<String>> {
        let path = self.session_path(id)?.join(file_name);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error)
                .with_context(|| format!("failed to read artifact {}", path.display())),
        }
    }

    /// Enumerates valid-format session directories, newest first. Corrupt or
    /// unreadable entries are skipped with a warning, never fatal.
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut records = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to list sessions root {}", self.root.display()))?;
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_session_id(&name).is_err() {
                continue;
            }
            match self.get_session(&name) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(session_id = %name, %error, "skipping unreadable session");
                }
            }
        }
        records.sort_by(|left, right| {
            right
                .metadata
                .timestamp_unix_ms
                .cmp(&left.metadata.timestamp_unix_ms)
        });
        Ok(records)
    }

    /// Deletes every session older than the retention window. Per-session
    /// failures are logged and skipped so one bad session cannot block the
    /// sweep. Returns the ids removed.
    pub fn cleanup(&self) -> Vec<String> {
        self.cleanup_at(current_unix_timestamp_ms())
    }

    pub(crate) fn cleanup_at(&self, now_unix_ms: u64) -> Vec<String> {
        let retention_ms = self.retention_days.saturating_mul(86_400_000);
        let mut removed = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(%error, root = %self.root.display(), "retention sweep cannot list sessions root");
                return removed;
            }
        };
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_session_id(&name).is_err() {
                continue;
            }
            let expired = match self.get_session(&name) {
                Ok(Some(record)) => {
                    now_unix_ms.saturating_sub(record.metadata.timestamp_unix_ms) > retention_ms
                }
                Ok(None) => false,
                Err(error) => {
                    tracing::warn!(session_id = %name, %error, "retention sweep skipping corrupt session");
                    continue;
                }
            };
            if !expired {
                continue;
            }
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    tracing::info!(session_id = %name, "removed expired session");
                    removed.push(name);
                }
                Err(error) => {
                    tracing::warn!(session_id = %name, %error, "failed to remove expired session");
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests;
