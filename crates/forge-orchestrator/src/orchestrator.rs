use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use forge_core::current_unix_timestamp_ms;
use forge_credentials::{sanitize_bot_mentions, Redactor};
use forge_prompt::{build_prompt, OperationType, PromptContext};
use forge_session::{generate_session_id, SessionMetadata, SessionStore};
use tokio::sync::Semaphore;

use crate::container::{ContainerInvocation, ContainerLimits, ContainerRunner, RunOutcome};
use crate::environment::{
    assemble_environment, derive_container_name, substitute_env_placeholders, CONTAINER_TRACE_DIR,
};

/// Capabilities every execution needs (file ownership and identity switches
/// during workspace setup). Everything else is granted only when listed in
/// `ExecutionLimits::optional_capabilities`.
const REQUIRED_CAPABILITIES: &[&str] = &["CHOWN", "DAC_OVERRIDE", "SETGID", "SETUID"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_OUTPUT_CAP_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 4;

/// Resource policy knobs with fixed defaults, all externally configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub memory: String,
    pub cpu_shares: u32,
    pub pids_limit: u32,
    pub privileged: bool,
    pub optional_capabilities: Vec<String>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            memory: "4g".to_string(),
            cpu_shares: 1024,
            pids_limit: 256,
            privileged: false,
            optional_capabilities: Vec::new(),
        }
    }
}

/// Identity the execution unit commits and comments as. The trigger name is
/// also the token mention-sanitization neutralizes in every output.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub trigger_name: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub image: String,
    pub image_build_context: Option<PathBuf>,
    pub limits: ExecutionLimits,
    pub timeout: Duration,
    pub output_cap_bytes: usize,
    pub bot: BotIdentity,
    pub test_mode: bool,
    pub tool_config_template: Option<PathBuf>,
    pub max_concurrent_executions: usize,
    /// Host-side root for per-execution trace scratch directories.
    pub trace_scratch_root: PathBuf,
}

impl OrchestratorConfig {
    pub fn new(image: impl Into<String>, bot: BotIdentity, trace_scratch_root: PathBuf) -> Self {
        Self {
            image: image.into(),
            image_build_context: None,
            limits: ExecutionLimits::default(),
            timeout: DEFAULT_TIMEOUT,
            output_cap_bytes: DEFAULT_OUTPUT_CAP_BYTES,
            bot,
            test_mode: false,
            tool_config_template: None,
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            trace_scratch_root,
        }
    }
}

/// The orchestrator's input for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub operation_type: OperationType,
    pub repo_full_name: Option<String>,
    pub issue_number: Option<u64>,
    pub is_pull_request: bool,
    pub branch_name: Option<String>,
    pub command: String,
    pub operation_id: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(operation_type: OperationType, command: impl Into<String>) -> Self {
        Self {
            operation_type,
            repo_full_name: None,
            issue_number: None,
            is_pull_request: false,
            branch_name: None,
            command: command.into(),
            operation_id: None,
            channel_id: None,
            user_id: None,
        }
    }
}

/// Caller-visible outcome. Failures carry a short opaque reference; full
/// sanitized detail goes only to server-side logs.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub session_id: String,
    pub response: Option<String>,
    pub error: Option<String>,
    pub error_reference: Option<String>,
    pub session_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionPhase {
    Pending,
    ImageReady,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionPhase {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ImageReady => "image-ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        }
    }
}

/// Runs isolated, resource-limited executions and persists their artifacts.
pub struct ExecutionOrchestrator {
    config: OrchestratorConfig,
    runner: Arc<dyn ContainerRunner>,
    store: Arc<SessionStore>,
    credentials: BTreeMap<String, String>,
    redactor: Redactor,
    semaphore: Arc<Semaphore>,
}

impl ExecutionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        runner: Arc<dyn ContainerRunner>,
        store: Arc<SessionStore>,
        credentials: BTreeMap<String, String>,
    ) -> Self {
        let redactor = Redactor::new(credentials.values().cloned());
        let permits = config.max_concurrent_executions.max(1);
        Self {
            config,
            runner,
            store,
            credentials,
            redactor,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Dispatches one execution end to end: session allocation, prompt
    /// build, image readiness, container run under timeout, output recovery,
    /// sanitization, and artifact persistence. Never panics and never leaks
    /// credential material into the returned value.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_closed) => {
                return self
                    .failure(
                        &generate_session_id(),
                        None,
                        ExecutionPhase::Pending,
                        "execution slots unavailable".to_string(),
                    )
                    .await;
            }
        };

        let session_id = generate_session_id();
        tracing::debug!(%session_id, phase = ExecutionPhase::Pending.as_str(), "execution dispatched");
        let metadata = session_metadata(&session_id, &request);
        let session_path = match self.store.create_session(&metadata) {
            Ok(path) => path,
            Err(error) => {
                return self
                    .failure(
                        &session_id,
                        None,
                        ExecutionPhase::Pending,
                        format!("session creation failed: {error:#}"),
                    )
                    .await;
            }
        };

        let prompt = build_prompt(
            request.operation_type,
            &prompt_context(&request),
            &request.command,
        );
        if let Err(error) = self.store.save_prompt(&session_id, &prompt) {
            tracing::warn!(%session_id, %error, "failed to persist prompt artifact");
        }

        if self.config.test_mode {
            return self.test_mode_result(&session_id, &request, session_path);
        }

        if let Err(error) = self.ensure_image().await {
            let mut result = self
                .failure(
                    &session_id,
                    None,
                    ExecutionPhase::Pending,
                    format!("image readiness failed: {error:#}"),
                )
                .await;
            result.session_path = Some(session_path);
            return result;
        }
        tracing::debug!(%session_id, phase = ExecutionPhase::ImageReady.as_str(), image = %self.config.image, "image ready");

        let container_name = derive_container_name(request.repo_full_name.as_deref());
        let trace_scratch = self.config.trace_scratch_root.join(&container_name);
        if let Err(error) = std::fs::create_dir_all(&trace_scratch) {
            tracing::warn!(%error, path = %trace_scratch.display(), "failed to create trace scratch directory");
        }

        let invocation = ContainerInvocation {
            name: container_name.clone(),
            image: self.config.image.clone(),
            env: assemble_environment(
                &request,
                &prompt,
                &self.credentials,
                &self.config.bot,
                self.load_tool_config().as_deref(),
            ),
            mounts: vec![(trace_scratch.clone(), CONTAINER_TRACE_DIR.to_string())],
            limits: self.container_limits(),
        };

        tracing::info!(
            %session_id,
            container = %container_name,
            operation_type = request.operation_type.as_str(),
            phase = ExecutionPhase::Running.as_str(),
            "starting execution container"
        );
        let outcome = self
            .runner
            .run(&invocation, self.config.timeout, self.config.output_cap_bytes)
            .await;

        let mut result = match outcome {
            Err(error) => {
                self.failure(
                    &session_id,
                    Some(&container_name),
                    ExecutionPhase::Failed,
                    format!("container run failed: {error:#}"),
                )
                .await
            }
            Ok(RunOutcome::TimedOut) => {
                self.failure(
                    &session_id,
                    Some(&container_name),
                    ExecutionPhase::TimedOut,
                    format!(
                        "execution exceeded the {}s wall-clock timeout",
                        self.config.timeout.as_secs()
                    ),
                )
                .await
            }
            Ok(RunOutcome::Completed(output)) => {
                if output.exit_success {
                    self.complete(&session_id, &container_name, &trace_scratch, output.stdout)
                        .await
                } else {
                    self.failure(
                        &session_id,
                        Some(&container_name),
                        ExecutionPhase::Failed,
                        format!(
                            "container exited with failure: stdout='{}' stderr='{}'",
                            output.stdout.trim(),
                            output.stderr.trim()
                        ),
                    )
                    .await
                }
            }
        };
        result.session_path = Some(session_path);

        if let Err(error) = std::fs::remove_dir_all(&trace_scratch) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%error, path = %trace_scratch.display(), "failed to remove trace scratch directory");
            }
        }
        result
    }

    async fn complete(
        &self,
        session_id: &str,
        container_name: &str,
        trace_scratch: &Path,
        stdout: String,
    ) -> ExecutionResult {
        let raw_response = match self.recover_response(container_name, stdout).await {
            Ok(raw) => raw,
            Err(error) => {
                return self
                    .failure(
                        session_id,
                        Some(container_name),
                        ExecutionPhase::Failed,
                        format!("empty output and log recovery failed: {error:#}"),
                    )
                    .await;
            }
        };
        let response = sanitize_bot_mentions(
            &self.redactor.redact(&raw_response),
            &self.config.bot.trigger_name,
        );
        if let Err(error) = self.store.save_response(session_id, &response) {
            tracing::warn!(%session_id, %error, "failed to persist response artifact");
        }
        self.persist_traces(session_id, trace_scratch);
        let _ = self.runner.force_remove(container_name).await;
        tracing::info!(%session_id, phase = ExecutionPhase::Succeeded.as_str(), "execution completed");
        ExecutionResult {
            success: true,
            session_id: session_id.to_string(),
            response: Some(response),
            error: None,
            error_reference: None,
            session_path: None,
        }
    }

    /// Empty stdout after a reportedly successful run is recovered from the
    /// retained container logs before being declared a failure.
    async fn recover_response(&self, container_name: &str, stdout: String) -> Result<String> {
        if !stdout.trim().is_empty() {
            return Ok(stdout);
        }
        tracing::warn!(container = %container_name, "empty stdout, attempting log recovery");
        let logs = self.runner.fetch_logs(container_name).await?;
        if logs.trim().is_empty() {
            return Err(anyhow!("container produced no output"));
        }
        tracing::info!(container = %container_name, "response recovered from container logs");
        Ok(logs)
    }

    /// Image readiness with build-on-demand. Nothing is cached, so a failed
    /// build is retried on the next call.
    async fn ensure_image(&self) -> Result<()> {
        if self.runner.image_exists(&self.config.image).await? {
            return Ok(());
        }
        let build_context = self.config.image_build_context.as_deref().ok_or_else(|| {
            anyhow!(
                "execution image '{}' is missing and no build context is configured",
                self.config.image
            )
        })?;
        self.runner.build_image(&self.config.image, build_context).await
    }

    fn container_limits(&self) -> ContainerLimits {
        let mut capabilities: Vec<String> = REQUIRED_CAPABILITIES
            .iter()
            .map(|capability| capability.to_string())
            .collect();
        for optional in &self.config.limits.optional_capabilities {
            let normalized = optional.trim().to_ascii_uppercase();
            if !normalized.is_empty() && !capabilities.contains(&normalized) {
                capabilities.push(normalized);
            }
        }
        ContainerLimits {
            memory: self.config.limits.memory.clone(),
            cpu_shares: self.config.limits.cpu_shares,
            pids_limit: self.config.limits.pids_limit,
            privileged: self.config.limits.privileged,
            capabilities,
        }
    }

    fn load_tool_config(&self) -> Option<String> {
        let path = self.config.tool_config_template.as_deref()?;
        match std::fs::read_to_string(path) {
            Ok(template) => Some(substitute_env_placeholders(&template)),
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "tool config template unreadable");
                None
            }
        }
    }

    fn persist_traces(&self, session_id: &str, trace_scratch: &Path) {
        let html = trace_scratch.join("trace.html");
        if let Ok(content) = std::fs::read_to_string(&html) {
            if let Err(error) = self.store.save_trace_html(session_id, &content) {
                tracing::warn!(%session_id, %error, "failed to persist HTML trace");
            }
        }
        let jsonl = trace_scratch.join("trace.jsonl");
        if let Ok(content) = std::fs::read_to_string(&jsonl) {
            if let Err(error) = self.store.save_trace_jsonl(session_id, &content) {
                tracing::warn!(%session_id, %error, "failed to persist JSONL trace");
            }
        }
    }

    fn test_mode_result(
        &self,
        session_id: &str,
        request: &ExecutionRequest,
        session_path: PathBuf,
    ) -> ExecutionResult {
        // The stub echoes the command, so it takes the same redaction and
        // sanitization treatment as a real container response.
        let stub = sanitize_bot_mentions(
            &self.redactor.redact(&format!(
                "Test mode: execution skipped for operation type '{}'. Command acknowledged: {}",
                request.operation_type, request.command
            )),
            &self.config.bot.trigger_name,
        );
        if let Err(error) = self.store.save_response(session_id, &stub) {
            tracing::warn!(%session_id, %error, "failed to persist test-mode response");
        }
        ExecutionResult {
            success: true,
            session_id: session_id.to_string(),
            response: Some(stub),
            error: None,
            error_reference: None,
            session_path: Some(session_path),
        }
    }

    /// Shared failure path: redacted + sanitized detail to server logs, a
    /// short opaque reference to the caller, and best-effort container
    /// removal.
    async fn failure(
        &self,
        session_id: &str,
        container_name: Option<&str>,
        phase: ExecutionPhase,
        detail: String,
    ) -> ExecutionResult {
        let reference = format!("ERR-{}", &generate_session_id()[..8]);
        let sanitized_detail = sanitize_bot_mentions(
            &self.redactor.redact(&detail),
            &self.config.bot.trigger_name,
        );
        tracing::error!(
            %session_id,
            %reference,
            phase = phase.as_str(),
            detail = %sanitized_detail,
            "execution failed"
        );
        if let Some(name) = container_name {
            let _ = self.runner.force_remove(name).await;
        }
        let message = sanitize_bot_mentions(
            &format!(
                "Execution failed (reference {reference}, timestamp {})",
                current_unix_timestamp_ms()
            ),
            &self.config.bot.trigger_name,
        );
        ExecutionResult {
            success: false,
            session_id: session_id.to_string(),
            response: None,
            error: Some(message),
            error_reference: Some(reference),
            session_path: None,
        }
    }
}

fn prompt_context(request: &ExecutionRequest) -> PromptContext {
    PromptContext {
        repo_full_name: request.repo_full_name.clone(),
        issue_number: request.issue_number,
        is_pull_request: request.is_pull_request,
        branch_name: request.branch_name.clone(),
    }
}

fn session_metadata(session_id: &str, request: &ExecutionRequest) -> SessionMetadata {
    let mut metadata = SessionMetadata::new(
        session_id.to_string(),
        request
            .operation_id
            .clone()
            .unwrap_or_else(|| session_id.to_string()),
    );
    metadata.repo_full_name = request.repo_full_name.clone();
    metadata.issue_number = request.issue_number;
    metadata.is_pull_request = request.is_pull_request;
    metadata.branch_name = request.branch_name.clone();
    metadata.operation_type = Some(request.operation_type.as_str().to_string());
    metadata.channel_id = request.channel_id.clone();
    metadata.user_id = request.user_id.clone();
    metadata
}

#[cfg(test)]
mod tests;
