use std::collections::BTreeMap;

use forge_core::current_unix_timestamp_ms;
use forge_prompt::allowed_tools_line;
use regex::Regex;

use crate::orchestrator::{BotIdentity, ExecutionRequest};

/// Container-side directory the execution collaborator writes trace output
/// into; the orchestrator bind-mounts a host scratch directory here.
pub(crate) const CONTAINER_TRACE_DIR: &str = "/var/forge/trace";

/// Derives a collision-resistant container name from the repository (or
/// `general`) plus a millisecond timestamp, suitable for post-hoc log
/// retrieval.
pub(crate) fn derive_container_name(repo_full_name: Option<&str>) -> String {
    let segment = repo_full_name
        .map(sanitize_name_segment)
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| "general".to_string());
    format!("forge-{segment}-{}", current_unix_timestamp_ms())
}

fn sanitize_name_segment(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Substitutes `${VAR}` placeholders from the current process environment.
/// Unresolved placeholders are left intact rather than erroring, so a partial
/// template still produces a usable config blob.
pub fn substitute_env_placeholders(template: &str) -> String {
    let Ok(placeholder) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
        return template.to_string();
    };
    placeholder
        .replace_all(template, |captures: &regex::Captures<'_>| {
            let name = &captures[1];
            std::env::var(name).unwrap_or_else(|_| captures[0].to_string())
        })
        .into_owned()
}

/// Builds the isolated process's environment: request context, operation
/// type, the full instruction text, resolved credentials, bot identity, the
/// tool-integration config blob, and the trace output directory. This map is
/// the entire contract with the execution collaborator.
pub(crate) fn assemble_environment(
    request: &ExecutionRequest,
    prompt: &str,
    credentials: &BTreeMap<String, String>,
    bot: &BotIdentity,
    tool_config: Option<&str>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        "FORGE_OPERATION_TYPE".to_string(),
        request.operation_type.as_str().to_string(),
    );
    env.insert("FORGE_PROMPT".to_string(), prompt.to_string());
    env.insert(
        "FORGE_ALLOWED_TOOLS".to_string(),
        allowed_tools_line(request.operation_type),
    );
    env.insert(
        "FORGE_TRACE_DIR".to_string(),
        CONTAINER_TRACE_DIR.to_string(),
    );
    if let Some(repo) = request.repo_full_name.as_deref() {
        env.insert("FORGE_REPO_FULL_NAME".to_string(), repo.to_string());
    }
    if let Some(issue_number) = request.issue_number {
        env.insert("FORGE_ISSUE_NUMBER".to_string(), issue_number.to_string());
    }
    env.insert(
        "FORGE_IS_PULL_REQUEST".to_string(),
        request.is_pull_request.to_string(),
    );
    if let Some(branch) = request.branch_name.as_deref() {
        env.insert("FORGE_BRANCH_NAME".to_string(), branch.to_string());
    }
    env.insert("BOT_USERNAME".to_string(), bot.username.clone());
    env.insert("BOT_EMAIL".to_string(), bot.email.clone());
    env.insert("GIT_AUTHOR_NAME".to_string(), bot.username.clone());
    env.insert("GIT_AUTHOR_EMAIL".to_string(), bot.email.clone());
    env.insert("GIT_COMMITTER_NAME".to_string(), bot.username.clone());
    env.insert("GIT_COMMITTER_EMAIL".to_string(), bot.email.clone());
    for (name, value) in credentials {
        env.insert(name.clone(), value.clone());
    }
    if let Some(blob) = tool_config {
        env.insert("FORGE_TOOL_CONFIG".to_string(), blob.to_string());
    }
    env
}
