//! Runs resolved commands under a timeout with a bounded retry policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_common::{ExecutionId, Timestamp};
use warden_config::ExecutorConfig;

use crate::context::InvocationContext;
use crate::handler::{HandlerErrorKind, Invocation, Reply};
use crate::history::{ErrorDescriptor, ExecutionHistory, ExecutionRecord, FailureKind};
use crate::registry::CommandDescriptor;

/// Failure signatures that must not trigger an automatic retry.
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "permission denied",
    "not found",
    "invalid",
    "missing argument",
    "unknown command",
];

/// An execution that has started and not yet finished.
#[derive(Debug, Clone)]
pub struct ActiveExecution {
    /// Execution id.
    pub id: ExecutionId,
    /// Command being run.
    pub command: String,
    /// When it started.
    pub started_at: Timestamp,
    started: Instant,
}

#[derive(Debug, Default)]
struct DurationAgg {
    count: u64,
    sum_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

/// Executor counters for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Executions finished since startup.
    pub total: u64,
    /// Successful executions.
    pub successes: u64,
    /// Failed executions.
    pub failures: u64,
    /// Attempts that timed out.
    pub timeouts: u64,
    /// Retry attempts made.
    pub retries: u64,
    /// Executions currently in flight.
    pub active: usize,
    /// Shortest execution in milliseconds.
    pub min_duration_ms: u64,
    /// Longest execution in milliseconds.
    pub max_duration_ms: u64,
    /// Mean execution time in milliseconds.
    pub avg_duration_ms: f64,
}

enum AttemptOutcome {
    Success,
    Failure {
        kind: FailureKind,
        message: String,
        retryable: bool,
    },
}

/// Runs handlers and records what happened.
pub struct CommandExecutor {
    config: ExecutorConfig,
    history: ExecutionHistory,
    active: DashMap<ExecutionId, ActiveExecution>,
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    durations: Mutex<DurationAgg>,
}

impl CommandExecutor {
    /// Creates an executor with the given tunables.
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            config: config.clone(),
            history: ExecutionHistory::new(config.history_cap),
            active: DashMap::new(),
            total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            durations: Mutex::new(DurationAgg::default()),
        }
    }

    /// Runs the descriptor's handler for this invocation.
    ///
    /// Each attempt races the handler against the configured timeout. A
    /// timed-out handler is abandoned, not cancelled: the spawned task keeps
    /// running and only its result is discarded. A retry after a timeout can
    /// therefore run side effects twice; handlers with irreversible effects
    /// need their own idempotency keys.
    ///
    /// Never propagates a fault. Failures are recorded, counted, and answered
    /// with a coarse user-facing message.
    pub async fn execute(
        &self,
        ctx: Arc<dyn InvocationContext>,
        descriptor: &Arc<CommandDescriptor>,
        args: Vec<String>,
    ) -> bool {
        let command = descriptor.name().to_string();
        let started_at = Utc::now();
        let started = Instant::now();

        if let Some(problem) = validate_invocation(descriptor, &args) {
            warn!(command = %command, %problem, "invocation rejected before dispatch");
            self.finish(
                &ctx,
                &command,
                started_at,
                started,
                1,
                Some((FailureKind::Validation, problem)),
                false,
            )
            .await;
            return false;
        }

        let id = Uuid::new_v4();
        self.active.insert(
            id,
            ActiveExecution {
                id,
                command: command.clone(),
                started_at,
                started,
            },
        );

        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempts = 0u32;
        let mut failure: Option<(FailureKind, String)> = None;
        let mut exhausted_retryable = false;
        let mut success = false;

        while attempts < max_attempts {
            attempts += 1;
            match self.run_attempt(&ctx, descriptor, &command, &args).await {
                AttemptOutcome::Success => {
                    success = true;
                    failure = None;
                    break;
                }
                AttemptOutcome::Failure {
                    kind,
                    message,
                    retryable,
                } => {
                    failure = Some((kind, message));
                    if !retryable {
                        exhausted_retryable = false;
                        break;
                    }
                    exhausted_retryable = true;
                    if attempts < max_attempts {
                        self.retries.fetch_add(1, Ordering::Relaxed);
                        debug!(command = %command, attempt = attempts, "retrying after transient failure");
                    }
                }
            }
        }

        self.active.remove(&id);
        self.finish(
            &ctx,
            &command,
            started_at,
            started,
            attempts,
            failure,
            exhausted_retryable,
        )
        .await;
        success
    }

    async fn run_attempt(
        &self,
        ctx: &Arc<dyn InvocationContext>,
        descriptor: &Arc<CommandDescriptor>,
        command: &str,
        args: &[String],
    ) -> AttemptOutcome {
        let handler = descriptor.handler();
        let invocation = Invocation {
            context: Arc::clone(ctx),
            command: command.to_string(),
            args: args.to_vec(),
        };
        let task = tokio::spawn(async move { handler.run(invocation).await });
        let timeout = Duration::from_millis(self.config.timeout_ms);

        match tokio::time::timeout(timeout, task).await {
            Err(_) => {
                // Timer won the race. Dropping the JoinHandle detaches the
                // task; it may still settle later, unobserved.
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let message = format!("handler did not settle within {}ms", self.config.timeout_ms);
                warn!(command, %message, "execution timed out");
                let retryable = !matches_non_retryable(&message);
                AttemptOutcome::Failure {
                    kind: FailureKind::Timeout,
                    message,
                    retryable,
                }
            }
            Ok(Err(join_error)) => {
                let message = format!("handler panicked: {join_error}");
                warn!(command, %message, "execution attempt crashed");
                AttemptOutcome::Failure {
                    kind: FailureKind::Panic,
                    retryable: !matches_non_retryable(&message),
                    message,
                }
            }
            Ok(Ok(Err(handler_error))) => {
                let retryable = matches!(
                    handler_error.kind,
                    HandlerErrorKind::External | HandlerErrorKind::Other
                ) && !matches_non_retryable(&handler_error.message);
                AttemptOutcome::Failure {
                    kind: FailureKind::Handler,
                    message: handler_error.message,
                    retryable,
                }
            }
            Ok(Ok(Ok(reply))) => match reply {
                Reply::Message(text) if text.trim().is_empty() => AttemptOutcome::Failure {
                    kind: FailureKind::Validation,
                    message: "handler returned an empty reply".to_string(),
                    retryable: false,
                },
                Reply::Message(text) => {
                    if let Err(e) = ctx.reply(&text).await {
                        warn!(command, error = %e, "reply delivery failed");
                    }
                    AttemptOutcome::Success
                }
                Reply::Handled | Reply::Silent => AttemptOutcome::Success,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        ctx: &Arc<dyn InvocationContext>,
        command: &str,
        started_at: Timestamp,
        started: Instant,
        attempts: u32,
        failure: Option<(FailureKind, String)>,
        exhausted_retryable: bool,
    ) {
        let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

        self.total.fetch_add(1, Ordering::Relaxed);
        match &failure {
            None => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            Some((kind, message)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                let reply = user_facing_message(*kind, message, attempts, exhausted_retryable);
                if let Err(e) = ctx.reply(&reply).await {
                    warn!(command, error = %e, "failure reply delivery failed");
                }
            }
        }

        {
            let mut agg = self.durations.lock();
            agg.count += 1;
            agg.sum_ms += duration_ms;
            agg.max_ms = agg.max_ms.max(duration_ms);
            agg.min_ms = if agg.count == 1 {
                duration_ms
            } else {
                agg.min_ms.min(duration_ms)
            };
        }

        self.history.push(ExecutionRecord {
            id: Uuid::new_v4(),
            command: command.to_string(),
            user: ctx.sender(),
            scope: ctx.scope(),
            started_at,
            duration_ms,
            success: failure.is_none(),
            attempts,
            error: failure.map(|(kind, message)| ErrorDescriptor { kind, message }),
        });
    }

    /// The bounded execution history.
    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Executions currently in flight.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Drops active-table entries that outlived the stale threshold. The
    /// periodic sweep calls this; entries can leak if a task is aborted by a
    /// runtime shutdown between insert and remove.
    pub fn cleanup_stale_active(&self) {
        let threshold = Duration::from_secs(self.config.stale_active_secs);
        let stale: Vec<ExecutionId> = self
            .active
            .iter()
            .filter(|entry| entry.started.elapsed() > threshold)
            .map(|entry| *entry.key())
            .collect();
        for id in stale {
            if let Some((_, entry)) = self.active.remove(&id) {
                warn!(command = %entry.command, execution = %id, "stale active execution dropped");
            }
        }
    }

    /// Purges history records past the retention window.
    pub fn purge_history(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.retention_hours as i64);
        self.history.purge_older_than(cutoff);
    }

    /// Counters for the dashboard.
    pub fn stats(&self) -> ExecutorStats {
        let agg = self.durations.lock();
        ExecutorStats {
            total: self.total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            active: self.active.len(),
            min_duration_ms: agg.min_ms,
            max_duration_ms: agg.max_ms,
            avg_duration_ms: if agg.count > 0 {
                agg.sum_ms as f64 / agg.count as f64
            } else {
                0.0
            },
        }
    }
}

fn validate_invocation(descriptor: &CommandDescriptor, args: &[String]) -> Option<String> {
    if descriptor.name().is_empty() {
        return Some("descriptor has no name".to_string());
    }
    for (index, arg) in args.iter().enumerate() {
        if arg.is_empty() {
            return Some(format!("argument {index} is empty"));
        }
        if arg.chars().any(char::is_control) {
            return Some(format!("argument {index} contains control characters"));
        }
    }
    None
}

fn matches_non_retryable(message: &str) -> bool {
    let lowered = message.to_lowercase();
    NON_RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

fn user_facing_message(
    kind: FailureKind,
    message: &str,
    attempts: u32,
    exhausted_retryable: bool,
) -> String {
    if exhausted_retryable && attempts > 1 {
        return "Something went wrong while running that command. Please try again later."
            .to_string();
    }
    match kind {
        FailureKind::Timeout => "The command took too long and was aborted.".to_string(),
        _ => {
            let lowered = message.to_lowercase();
            if lowered.contains("permission") {
                "You do not have permission to use this command.".to_string()
            } else if lowered.contains("not found") {
                "Sorry, I couldn't find what that command was looking for.".to_string()
            } else {
                "Something went wrong while running that command. Please try again later."
                    .to_string()
            }
        }
    }
}
