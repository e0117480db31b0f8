//! Gateway server bootstrap and router wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use ed25519_dalek::VerifyingKey;
use forge_orchestrator::{ExecutionOrchestrator, OperationTracker};
use forge_session::SessionStore;
use tokio::net::TcpListener;

use crate::endpoints::{
    DISCORD_WEBHOOK_ENDPOINT, EXECUTE_ENDPOINT, GITHUB_WEBHOOK_ENDPOINT, HEALTH_ENDPOINT,
    SESSIONS_ENDPOINT, SESSION_DETAIL_ENDPOINT, SESSION_PROMPT_ENDPOINT,
    SESSION_RESPONSE_ENDPOINT, SESSION_TRACE_ENDPOINT, SESSION_TRACE_JSONL_ENDPOINT,
};
use crate::followup::FollowupNotifier;
use crate::{execute_api, session_api, webhook_discord, webhook_github};

/// Everything the handlers need, injected once at startup.
pub struct GatewayState {
    pub orchestrator: Arc<ExecutionOrchestrator>,
    pub store: Arc<SessionStore>,
    pub tracker: Arc<OperationTracker>,
    pub followups: Arc<dyn FollowupNotifier>,
    /// When unset, GitHub webhook signatures are not enforced (local
    /// development only; production always configures a secret).
    pub github_webhook_secret: Option<String>,
    /// When unset, Discord interactions are rejected outright.
    pub discord_public_key: Option<VerifyingKey>,
    pub bot_trigger: String,
}

pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(HEALTH_ENDPOINT, get(session_api::handle_health))
        .route(SESSIONS_ENDPOINT, get(session_api::handle_sessions_list))
        .route(
            SESSION_DETAIL_ENDPOINT,
            get(session_api::handle_session_detail),
        )
        .route(
            SESSION_PROMPT_ENDPOINT,
            get(session_api::handle_session_prompt),
        )
        .route(
            SESSION_RESPONSE_ENDPOINT,
            get(session_api::handle_session_response),
        )
        .route(
            SESSION_TRACE_ENDPOINT,
            get(session_api::handle_session_trace),
        )
        .route(
            SESSION_TRACE_JSONL_ENDPOINT,
            get(session_api::handle_session_trace_jsonl),
        )
        .route(EXECUTE_ENDPOINT, post(execute_api::handle_execute))
        .route(
            GITHUB_WEBHOOK_ENDPOINT,
            post(webhook_github::handle_github_webhook),
        )
        .route(
            DISCORD_WEBHOOK_ENDPOINT,
            post(webhook_discord::handle_discord_webhook),
        )
        .with_state(state)
}

pub async fn run_gateway_server(bind: &str, state: Arc<GatewayState>) -> Result<()> {
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(%local_addr, "gateway server listening");

    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")
}
