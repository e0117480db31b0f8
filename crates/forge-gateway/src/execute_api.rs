use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_orchestrator::ExecutionRequest;
use forge_prompt::OperationType;
use forge_session::generate_session_id;
use serde::Deserialize;
use serde_json::json;

use crate::api_error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExecuteApiRequest {
    command: String,
    #[serde(default)]
    operation_type: Option<OperationType>,
    #[serde(default)]
    repo_full_name: Option<String>,
    #[serde(default)]
    issue_number: Option<u64>,
    #[serde(default)]
    is_pull_request: bool,
    #[serde(default)]
    branch_name: Option<String>,
}

/// Direct dispatch: acknowledges immediately with the operation id and runs
/// the execution in the background. The resulting session carries the same
/// operation id in its metadata.
pub(crate) async fn handle_execute(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<ExecuteApiRequest>,
) -> Response {
    if body.command.trim().is_empty() {
        return ApiError::bad_request("empty_command", "command must not be empty")
            .into_response();
    }

    let operation_id = generate_session_id();
    let mut request = ExecutionRequest::new(
        body.operation_type.unwrap_or(OperationType::Default),
        body.command,
    );
    request.repo_full_name = body.repo_full_name;
    request.issue_number = body.issue_number;
    request.is_pull_request = body.is_pull_request;
    request.branch_name = body.branch_name;
    request.operation_id = Some(operation_id.clone());

    let orchestrator = Arc::clone(&state.orchestrator);
    let dispatched_id = operation_id.clone();
    tokio::spawn(async move {
        let result = orchestrator.execute(request).await;
        if !result.success {
            tracing::warn!(
                operation_id = %dispatched_id,
                session_id = %result.session_id,
                reference = result.error_reference.as_deref().unwrap_or(""),
                "direct execution failed"
            );
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "operation_id": operation_id,
        })),
    )
        .into_response()
}
