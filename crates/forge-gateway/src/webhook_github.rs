use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_orchestrator::ExecutionRequest;
use forge_prompt::OperationType;
use forge_session::generate_session_id;
use serde::Deserialize;
use serde_json::json;

use crate::api_error::ApiError;
use crate::server::GatewayState;
use crate::signature::verify_github_signature;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";

#[derive(Debug, Deserialize)]
struct GithubWebhookPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    issue: Option<GithubIssue>,
    #[serde(default)]
    pull_request: Option<GithubPullRequest>,
    #[serde(default)]
    comment: Option<GithubComment>,
    #[serde(default)]
    repository: Option<GithubRepository>,
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GithubPullRequest {
    number: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    head: Option<GithubBranchRef>,
}

#[derive(Debug, Deserialize)]
struct GithubBranchRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct GithubComment {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<GithubUser>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepository {
    full_name: String,
}

pub(crate) async fn handle_github_webhook(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.github_webhook_secret.as_deref() {
        let Some(signature) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return ApiError::unauthorized(
                "missing_signature",
                "x-hub-signature-256 header is required",
            )
            .into_response();
        };
        if let Err(error) = verify_github_signature(&body, signature, secret) {
            tracing::warn!(%error, "rejected github webhook");
            return ApiError::unauthorized(
                "invalid_signature",
                "webhook signature verification failed",
            )
            .into_response();
        }
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let payload: GithubWebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            return ApiError::bad_request(
                "invalid_payload",
                format!("failed to parse webhook payload: {error}"),
            )
            .into_response();
        }
    };

    let Some(request) = classify_github_event(event, &payload, &state.bot_trigger) else {
        return (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response();
    };

    let operation_id = generate_session_id();
    let mut request = request;
    request.operation_id = Some(operation_id.clone());
    tracing::info!(
        %operation_id,
        event,
        operation_type = request.operation_type.as_str(),
        repo = request.repo_full_name.as_deref().unwrap_or(""),
        "dispatching github webhook event"
    );
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        let result = orchestrator.execute(request).await;
        if !result.success {
            tracing::warn!(
                session_id = %result.session_id,
                reference = result.error_reference.as_deref().unwrap_or(""),
                "github webhook execution failed"
            );
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "dispatched",
            "operation_id": operation_id,
        })),
    )
        .into_response()
}

/// Maps a webhook event to an execution request, or `None` when the event is
/// not actionable. Privilege scope comes solely from the mapped operation
/// type.
fn classify_github_event(
    event: &str,
    payload: &GithubWebhookPayload,
    bot_trigger: &str,
) -> Option<ExecutionRequest> {
    let action = payload.action.as_deref().unwrap_or("");
    let repo_full_name = payload
        .repository
        .as_ref()
        .map(|repository| repository.full_name.clone());

    match (event, action) {
        ("issues", "opened") => {
            let issue = payload.issue.as_ref()?;
            let command = format!(
                "Label this issue.\n\nTitle: {}\n\n{}",
                issue.title.as_deref().unwrap_or(""),
                issue.body.as_deref().unwrap_or(""),
            );
            let mut request = ExecutionRequest::new(OperationType::AutoTagging, command);
            request.repo_full_name = repo_full_name;
            request.issue_number = Some(issue.number);
            Some(request)
        }
        ("pull_request", "opened") => {
            let pull_request = payload.pull_request.as_ref()?;
            let command = format!(
                "Review this pull request.\n\nTitle: {}\n\n{}",
                pull_request.title.as_deref().unwrap_or(""),
                pull_request.body.as_deref().unwrap_or(""),
            );
            let mut request = ExecutionRequest::new(OperationType::PrReview, command);
            request.repo_full_name = repo_full_name;
            request.issue_number = Some(pull_request.number);
            request.is_pull_request = true;
            request.branch_name = pull_request
                .head
                .as_ref()
                .map(|head| head.branch.clone());
            Some(request)
        }
        ("issue_comment", "created") => {
            let issue = payload.issue.as_ref()?;
            let comment = payload.comment.as_ref()?;
            let comment_body = comment.body.as_deref()?;
            if !contains_trigger_mention(comment_body, bot_trigger) {
                return None;
            }
            // The bot quoting its own trigger must not re-trigger it.
            if let Some(user) = comment.user.as_ref() {
                if user.login.eq_ignore_ascii_case(bot_trigger) {
                    return None;
                }
            }
            let is_pull_request = issue.pull_request.is_some();
            let operation_type = if is_pull_request
                && mentions_review_request(comment_body)
            {
                OperationType::ManualPrReview
            } else {
                OperationType::GithubContext
            };
            let mut request = ExecutionRequest::new(operation_type, comment_body.to_string());
            request.repo_full_name = repo_full_name;
            request.issue_number = Some(issue.number);
            request.is_pull_request = is_pull_request;
            Some(request)
        }
        _ => None,
    }
}

fn contains_trigger_mention(text: &str, trigger: &str) -> bool {
    let needle = format!("@{}", trigger.to_lowercase());
    let haystack = text.to_lowercase();
    haystack
        .match_indices(&needle)
        .any(|(index, matched)| match haystack.as_bytes().get(index + matched.len()) {
            // Reject longer handles that merely share the prefix.
            Some(byte) => !byte.is_ascii_alphanumeric() && *byte != b'-' && *byte != b'_',
            None => true,
        })
}

fn mentions_review_request(text: &str) -> bool {
    text.to_lowercase().contains("review")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: serde_json::Value) -> GithubWebhookPayload {
        serde_json::from_value(json).expect("payload should parse")
    }

    #[test]
    fn issue_opened_maps_to_auto_tagging() {
        let payload = payload(serde_json::json!({
            "action": "opened",
            "issue": {"number": 12, "title": "Crash on startup", "body": "stacktrace"},
            "repository": {"full_name": "acme/widget"},
        }));
        let request =
            classify_github_event("issues", &payload, "ForgeBot").expect("actionable event");
        assert_eq!(request.operation_type, OperationType::AutoTagging);
        assert_eq!(request.repo_full_name.as_deref(), Some("acme/widget"));
        assert_eq!(request.issue_number, Some(12));
        assert!(request.command.contains("Crash on startup"));
    }

    #[test]
    fn pull_request_opened_maps_to_pr_review() {
        let payload = payload(serde_json::json!({
            "action": "opened",
            "pull_request": {
                "number": 7,
                "title": "Add retry",
                "body": "retries transient failures",
                "head": {"ref": "feature/retry"},
            },
            "repository": {"full_name": "acme/widget"},
        }));
        let request =
            classify_github_event("pull_request", &payload, "ForgeBot").expect("actionable event");
        assert_eq!(request.operation_type, OperationType::PrReview);
        assert!(request.is_pull_request);
        assert_eq!(request.branch_name.as_deref(), Some("feature/retry"));
    }

    #[test]
    fn comment_mention_maps_to_github_context() {
        let payload = payload(serde_json::json!({
            "action": "created",
            "issue": {"number": 3},
            "comment": {"body": "@forgebot please summarize", "user": {"login": "octocat"}},
            "repository": {"full_name": "acme/widget"},
        }));
        let request =
            classify_github_event("issue_comment", &payload, "ForgeBot").expect("actionable event");
        assert_eq!(request.operation_type, OperationType::GithubContext);
        assert!(!request.is_pull_request);
    }

    #[test]
    fn review_mention_on_a_pull_request_maps_to_manual_pr_review() {
        let payload = payload(serde_json::json!({
            "action": "created",
            "issue": {"number": 9, "pull_request": {"url": "https://example.invalid"}},
            "comment": {"body": "@ForgeBot review this please", "user": {"login": "octocat"}},
            "repository": {"full_name": "acme/widget"},
        }));
        let request =
            classify_github_event("issue_comment", &payload, "ForgeBot").expect("actionable event");
        assert_eq!(request.operation_type, OperationType::ManualPrReview);
        assert!(request.is_pull_request);
    }

    #[test]
    fn comment_without_mention_is_ignored() {
        let payload = payload(serde_json::json!({
            "action": "created",
            "issue": {"number": 3},
            "comment": {"body": "no bot here", "user": {"login": "octocat"}},
            "repository": {"full_name": "acme/widget"},
        }));
        assert!(classify_github_event("issue_comment", &payload, "ForgeBot").is_none());
    }

    #[test]
    fn self_comments_never_retrigger() {
        let payload = payload(serde_json::json!({
            "action": "created",
            "issue": {"number": 3},
            "comment": {"body": "@ForgeBot said this", "user": {"login": "forgebot"}},
            "repository": {"full_name": "acme/widget"},
        }));
        assert!(classify_github_event("issue_comment", &payload, "ForgeBot").is_none());
    }

    #[test]
    fn mention_detection_requires_a_handle_boundary() {
        assert!(contains_trigger_mention("hey @ForgeBot!", "ForgeBot"));
        assert!(contains_trigger_mention("@forgebot", "ForgeBot"));
        assert!(!contains_trigger_mention("@ForgeBotler", "ForgeBot"));
        assert!(!contains_trigger_mention("ForgeBot without at", "ForgeBot"));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let payload = payload(serde_json::json!({"action": "deleted"}));
        assert!(classify_github_event("star", &payload, "ForgeBot").is_none());
        assert!(classify_github_event("issues", &payload, "ForgeBot").is_none());
    }
}
