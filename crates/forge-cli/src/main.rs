mod cli_args;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use forge_credentials::CredentialResolver;
use forge_gateway::{
    parse_discord_public_key, run_gateway_server, GatewayState, WebhookFollowupNotifier,
};
use forge_orchestrator::{
    BotIdentity, DockerContainerRunner, ExecutionOrchestrator, OperationTracker,
    OrchestratorConfig, DEFAULT_OPERATION_MAX_AGE_MS,
};
use forge_session::{spawn_cleanup_task, SessionStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

/// Container-visible credentials, resolved at startup and injected into
/// every execution environment.
const CONTAINER_CREDENTIALS: &[&str] = &["GITHUB_TOKEN", "AGENT_API_KEY"];

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();

    let resolver = CredentialResolver::new(&args.secrets_dir);
    let mut credentials = BTreeMap::new();
    for name in CONTAINER_CREDENTIALS {
        if let Some(resolved) = resolver.resolve(name) {
            tracing::info!(credential = name, source = %resolved.source, "credential resolved");
            credentials.insert((*name).to_string(), resolved.value);
        } else {
            tracing::warn!(credential = name, "credential not configured");
        }
    }
    // Executions cannot interact with GitHub without a token; fail fast
    // instead of dispatching containers that cannot do their work.
    if !args.test_mode && !credentials.contains_key("GITHUB_TOKEN") {
        resolver.require("GITHUB_TOKEN")?;
    }
    let github_webhook_secret = resolver
        .resolve("GITHUB_WEBHOOK_SECRET")
        .map(|resolved| resolved.value);
    if github_webhook_secret.is_none() {
        tracing::warn!("GITHUB_WEBHOOK_SECRET not configured; github webhooks are unverified");
    }
    let discord_public_key = resolver
        .resolve("DISCORD_PUBLIC_KEY")
        .map(|resolved| parse_discord_public_key(&resolved.value))
        .transpose()
        .context("failed to parse DISCORD_PUBLIC_KEY")?;
    if discord_public_key.is_none() {
        tracing::warn!("DISCORD_PUBLIC_KEY not configured; discord interactions are disabled");
    }

    let store = Arc::new(
        SessionStore::new(args.data_dir.join("sessions"), args.retention_days)
            .context("failed to open session store")?,
    );
    spawn_cleanup_task(Arc::clone(&store), CLEANUP_INTERVAL);

    let tracker = Arc::new(OperationTracker::new());
    let sweep_tracker = Arc::clone(&tracker);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sweep_tracker.cleanup(DEFAULT_OPERATION_MAX_AGE_MS);
            if removed > 0 {
                tracing::info!(removed, "pending operation sweep complete");
            }
        }
    });

    let bot = BotIdentity {
        trigger_name: args.bot_trigger.clone(),
        username: args.bot_username.clone(),
        email: args.bot_email.clone(),
    };
    let mut config = OrchestratorConfig::new(
        args.image.clone(),
        bot,
        args.data_dir.join("trace"),
    );
    config.image_build_context = args.build_context.clone();
    config.limits.memory = args.memory.clone();
    config.limits.cpu_shares = args.cpu_shares;
    config.limits.pids_limit = args.pids_limit;
    config.limits.privileged = args.privileged;
    config.limits.optional_capabilities = args.capabilities.clone();
    config.timeout = Duration::from_millis(args.timeout_ms);
    config.output_cap_bytes = args.output_buffer_bytes;
    config.test_mode = args.test_mode;
    config.tool_config_template = args.tool_config.clone();
    config.max_concurrent_executions = args.max_concurrent_executions;

    let runner = Arc::new(DockerContainerRunner::new(args.docker_binary.clone()));
    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        config,
        runner,
        Arc::clone(&store),
        credentials,
    ));

    let state = Arc::new(GatewayState {
        orchestrator,
        store,
        tracker,
        followups: Arc::new(WebhookFollowupNotifier::new()),
        github_webhook_secret,
        discord_public_key,
        bot_trigger: args.bot_trigger.clone(),
    });

    run_gateway_server(&args.bind, state).await
}
