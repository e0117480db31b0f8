//! Execution orchestration: isolated container runs with explicit resource
//! limits, credential handling, output recovery, and session persistence.
//!
//! The orchestrator is constructed once with its collaborators (session
//! store, credential set, container runner) and handed to the gateway; there
//! are no process-wide singletons, so tests inject a fake runner and a
//! temporary store.

mod container;
mod environment;
mod orchestrator;
mod tracker;

pub use container::{
    ContainerInvocation, ContainerLimits, ContainerRunOutput, ContainerRunner,
    DockerContainerRunner, RunOutcome,
};
pub use environment::substitute_env_placeholders;
pub use orchestrator::{
    BotIdentity, ExecutionLimits, ExecutionOrchestrator, ExecutionRequest, ExecutionResult,
    OrchestratorConfig,
};
pub use tracker::{OperationTracker, PendingOperation, DEFAULT_OPERATION_MAX_AGE_MS};
