use std::collections::HashMap;
use std::sync::Mutex;

use forge_core::current_unix_timestamp_ms;

/// Default stale-operation horizon: two hours, matching the execution
/// wall-clock timeout.
pub const DEFAULT_OPERATION_MAX_AGE_MS: u64 = 2 * 60 * 60 * 1000;

/// One in-flight deferred operation awaiting a follow-up notification.
/// The interaction token is the only handle for delivering the result back
/// to the originating chat surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub operation_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub command: String,
    pub repository: Option<String>,
    pub started_unix_ms: u64,
    pub interaction_token: String,
    pub full_prompt: Option<String>,
}

/// In-memory registry of deferred operations. Contents are intentionally
/// not persisted: after a restart the originating interactions have expired
/// anyway.
#[derive(Debug, Default)]
pub struct OperationTracker {
    operations: Mutex<HashMap<String, PendingOperation>>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation, stamping its start time. Re-registering an id
    /// replaces the previous entry.
    pub fn start(&self, mut operation: PendingOperation) {
        operation.started_unix_ms = current_unix_timestamp_ms();
        let mut operations = lock_or_recover(&self.operations);
        operations.insert(operation.operation_id.clone(), operation);
    }

    pub fn get(&self, operation_id: &str) -> Option<PendingOperation> {
        let operations = lock_or_recover(&self.operations);
        operations.get(operation_id).cloned()
    }

    /// Removes and returns the operation, marking it finished.
    pub fn complete(&self, operation_id: &str) -> Option<PendingOperation> {
        let mut operations = lock_or_recover(&self.operations);
        operations.remove(operation_id)
    }

    pub fn list_pending(&self) -> Vec<PendingOperation> {
        let operations = lock_or_recover(&self.operations);
        let mut pending: Vec<PendingOperation> = operations.values().cloned().collect();
        pending.sort_by(|left, right| left.started_unix_ms.cmp(&right.started_unix_ms));
        pending
    }

    /// Drops operations older than `max_age_ms` and returns how many were
    /// removed. Stale entries mean the execution outlived every chance of
    /// delivering a follow-up.
    pub fn cleanup(&self, max_age_ms: u64) -> usize {
        self.cleanup_at(max_age_ms, current_unix_timestamp_ms())
    }

    fn cleanup_at(&self, max_age_ms: u64, now_ms: u64) -> usize {
        let mut operations = lock_or_recover(&self.operations);
        let before = operations.len();
        operations.retain(|operation_id, operation| {
            let age_ms = now_ms.saturating_sub(operation.started_unix_ms);
            let keep = age_ms <= max_age_ms;
            if !keep {
                tracing::warn!(%operation_id, age_ms, "removing stale pending operation");
            }
            keep
        });
        before - operations.len()
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
