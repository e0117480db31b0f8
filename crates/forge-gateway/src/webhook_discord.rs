use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_orchestrator::{ExecutionRequest, PendingOperation};
use forge_prompt::OperationType;
use forge_session::generate_session_id;
use serde::Deserialize;
use serde_json::json;

use crate::api_error::ApiError;
use crate::server::GatewayState;
use crate::signature::verify_discord_signature;

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

const INTERACTION_PING: u8 = 1;
const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const RESPONSE_PONG: u8 = 1;
const RESPONSE_DEFERRED_CHANNEL_MESSAGE: u8 = 5;

/// Hard cap on follow-up message length imposed by the chat surface.
const MESSAGE_CONTENT_LIMIT: usize = 2000;

#[derive(Debug, Deserialize)]
struct DiscordInteraction {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    application_id: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<DiscordCommandData>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    member: Option<DiscordMember>,
    #[serde(default)]
    user: Option<DiscordUser>,
}

#[derive(Debug, Deserialize)]
struct DiscordCommandData {
    name: String,
    #[serde(default)]
    options: Vec<DiscordCommandOption>,
}

#[derive(Debug, Deserialize)]
struct DiscordCommandOption {
    name: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    #[serde(default)]
    user: Option<DiscordUser>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
}

pub(crate) async fn handle_discord_webhook(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(public_key) = state.discord_public_key.as_ref() else {
        return ApiError::unauthorized(
            "interactions_not_configured",
            "discord interactions are not configured",
        )
        .into_response();
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if let Err(error) = verify_discord_signature(public_key, timestamp, &body, signature) {
        tracing::warn!(%error, "rejected discord interaction");
        return ApiError::unauthorized(
            "invalid_signature",
            "interaction signature verification failed",
        )
        .into_response();
    }

    let interaction: DiscordInteraction = match serde_json::from_slice(&body) {
        Ok(interaction) => interaction,
        Err(error) => {
            return ApiError::bad_request(
                "invalid_payload",
                format!("failed to parse interaction payload: {error}"),
            )
            .into_response();
        }
    };

    match interaction.kind {
        INTERACTION_PING => {
            (StatusCode::OK, Json(json!({"type": RESPONSE_PONG}))).into_response()
        }
        INTERACTION_APPLICATION_COMMAND => dispatch_command(&state, interaction).await,
        other => {
            tracing::debug!(kind = other, "ignoring unsupported interaction type");
            (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response()
        }
    }
}

/// Defers the interaction immediately and runs the execution in the
/// background; the result is delivered through the interaction's follow-up
/// webhook and the operation is tracked until then.
async fn dispatch_command(state: &Arc<GatewayState>, interaction: DiscordInteraction) -> Response {
    let Some(token) = interaction.token.clone() else {
        return ApiError::bad_request("missing_token", "interaction token is required")
            .into_response();
    };
    let Some(application_id) = interaction.application_id.clone() else {
        return ApiError::bad_request("missing_application_id", "application id is required")
            .into_response();
    };
    let Some(data) = interaction.data.as_ref() else {
        return ApiError::bad_request("missing_data", "interaction data is required")
            .into_response();
    };
    let Some(command) = option_string(data, "command") else {
        return ApiError::bad_request(
            "missing_command",
            "a 'command' option with the instruction text is required",
        )
        .into_response();
    };
    let repository = option_string(data, "repository");
    let channel_id = interaction.channel_id.clone().unwrap_or_default();
    let user_id = interaction
        .member
        .as_ref()
        .and_then(|member| member.user.as_ref())
        .or(interaction.user.as_ref())
        .map(|user| user.id.clone())
        .unwrap_or_default();
    let operation_id = interaction
        .id
        .clone()
        .unwrap_or_else(generate_session_id);

    state.tracker.start(PendingOperation {
        operation_id: operation_id.clone(),
        user_id: user_id.clone(),
        channel_id: channel_id.clone(),
        guild_id: interaction.guild_id.clone(),
        command: command.clone(),
        repository: repository.clone(),
        started_unix_ms: 0,
        interaction_token: token.clone(),
        full_prompt: None,
    });
    tracing::info!(
        %operation_id,
        command_name = %data.name,
        repo = repository.as_deref().unwrap_or(""),
        "dispatching discord command"
    );

    let operation_type = if repository.is_some() {
        OperationType::DiscordRepository
    } else {
        OperationType::Default
    };
    let mut request = ExecutionRequest::new(operation_type, command);
    request.repo_full_name = repository;
    // Chat dispatches have no real issue; the zero sentinel selects the
    // repository-chat instructions downstream.
    request.issue_number = request.repo_full_name.as_ref().map(|_| 0);
    request.operation_id = Some(operation_id.clone());
    request.channel_id = Some(channel_id);
    request.user_id = Some(user_id);

    let orchestrator = Arc::clone(&state.orchestrator);
    let tracker = Arc::clone(&state.tracker);
    let followups = Arc::clone(&state.followups);
    tokio::spawn(async move {
        let result = orchestrator.execute(request).await;
        let content = result
            .response
            .or(result.error)
            .unwrap_or_else(|| "Execution finished with no output.".to_string());
        let content = truncate_message(&content);
        if let Err(error) = followups.notify(&application_id, &token, &content).await {
            tracing::warn!(%operation_id, %error, "failed to deliver follow-up message");
        }
        tracker.complete(&operation_id);
    });

    (
        StatusCode::OK,
        Json(json!({"type": RESPONSE_DEFERRED_CHANNEL_MESSAGE})),
    )
        .into_response()
}

fn option_string(data: &DiscordCommandData, name: &str) -> Option<String> {
    data.options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_ref())
        .and_then(|value| value.as_str())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_message(content: &str) -> String {
    if content.len() <= MESSAGE_CONTENT_LIMIT {
        return content.to_string();
    }
    let mut cut = MESSAGE_CONTENT_LIMIT;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(options: serde_json::Value) -> DiscordCommandData {
        serde_json::from_value(json!({"name": "forge", "options": options}))
            .expect("command data should parse")
    }

    #[test]
    fn option_lookup_trims_and_skips_empty_values() {
        let data = data(json!([
            {"name": "command", "value": "  run the linter  "},
            {"name": "repository", "value": ""},
        ]));
        assert_eq!(
            option_string(&data, "command").as_deref(),
            Some("run the linter")
        );
        assert!(option_string(&data, "repository").is_none());
        assert!(option_string(&data, "missing").is_none());
    }

    #[test]
    fn message_truncation_respects_char_boundaries() {
        let short = "done";
        assert_eq!(truncate_message(short), "done");

        let long = "é".repeat(MESSAGE_CONTENT_LIMIT);
        let truncated = truncate_message(&long);
        assert!(truncated.len() <= MESSAGE_CONTENT_LIMIT);
        assert!(truncated.chars().all(|ch| ch == 'é'));
    }
}
