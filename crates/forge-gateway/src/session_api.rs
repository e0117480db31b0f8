use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_session::{validate_session_id, SessionRecord, SessionStore};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api_error::ApiError;
use crate::server::GatewayState;

pub(crate) async fn handle_health() -> Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct SessionsListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

pub(crate) async fn handle_sessions_list(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<SessionsListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let records = match state.store.list_sessions() {
        Ok(records) => records,
        Err(error) => {
            return ApiError::internal("list sessions", &error).into_response();
        }
    };
    let sessions = records
        .into_iter()
        .take(limit)
        .map(session_record_json)
        .collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(json!({
            "sessions": sessions,
            "limit": limit,
        })),
    )
        .into_response()
}

pub(crate) async fn handle_session_detail(
    State(state): State<Arc<GatewayState>>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    if validate_session_id(&session_id).is_err() {
        return session_not_found(&session_id).into_response();
    }
    match state.store.get_session(&session_id) {
        Ok(Some(record)) => (StatusCode::OK, Json(session_record_json(record))).into_response(),
        Ok(None) => session_not_found(&session_id).into_response(),
        Err(error) => ApiError::internal("read session", &error).into_response(),
    }
}

pub(crate) async fn handle_session_prompt(
    State(state): State<Arc<GatewayState>>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match read_artifact(&state, &session_id, "prompt", SessionStore::get_prompt) {
        Ok(prompt) => text_response(prompt, "text/plain; charset=utf-8"),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn handle_session_response(
    State(state): State<Arc<GatewayState>>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match read_artifact(&state, &session_id, "response", SessionStore::get_response) {
        Ok(response) => text_response(response, "text/plain; charset=utf-8"),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn handle_session_trace(
    State(state): State<Arc<GatewayState>>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match read_artifact(&state, &session_id, "trace", SessionStore::get_trace_html) {
        Ok(trace) => text_response(trace, "text/html; charset=utf-8"),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn handle_session_trace_jsonl(
    State(state): State<Arc<GatewayState>>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match read_artifact(&state, &session_id, "trace.jsonl", SessionStore::get_trace_jsonl) {
        Ok(trace) => text_response(trace, "application/x-ndjson"),
        Err(error) => error.into_response(),
    }
}

/// Shared artifact lookup: an invalid id and an absent artifact are both
/// not-found, so probing the path space reveals nothing.
fn read_artifact(
    state: &GatewayState,
    session_id: &str,
    artifact: &'static str,
    read: impl Fn(&SessionStore, &str) -> anyhow::Result<Option<String>>,
) -> Result<String, ApiError> {
    if validate_session_id(session_id).is_err() {
        return Err(artifact_not_found(session_id, artifact));
    }
    match read(&state.store, session_id) {
        Ok(Some(content)) => Ok(content),
        Ok(None) => Err(artifact_not_found(session_id, artifact)),
        Err(error) => Err(ApiError::internal("read session artifact", &error)),
    }
}

fn text_response(content: String, content_type: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content,
    )
        .into_response()
}

fn session_not_found(session_id: &str) -> ApiError {
    ApiError::not_found(
        "session_not_found",
        format!("session '{session_id}' does not exist"),
    )
}

fn artifact_not_found(session_id: &str, artifact: &'static str) -> ApiError {
    ApiError::not_found(
        "artifact_not_found",
        format!("session '{session_id}' has no {artifact} artifact"),
    )
}

fn session_record_json(record: SessionRecord) -> Value {
    json!({
        "id": record.metadata.id,
        "timestamp_unix_ms": record.metadata.timestamp_unix_ms,
        "operation_id": record.metadata.operation_id,
        "repo_full_name": record.metadata.repo_full_name,
        "issue_number": record.metadata.issue_number,
        "is_pull_request": record.metadata.is_pull_request,
        "branch_name": record.metadata.branch_name,
        "operation_type": record.metadata.operation_type,
        "channel_id": record.metadata.channel_id,
        "user_id": record.metadata.user_id,
        "has_prompt": record.has_prompt,
        "has_response": record.has_response,
        "has_trace_html": record.has_trace_html,
        "has_trace_jsonl": record.has_trace_jsonl,
    })
}
