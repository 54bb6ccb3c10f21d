//! Structured scheduler events and the sink they flow into.
//!
//! The sink is a pure outlet: `record` must not block and the scheduler never
//! waits on it. The default implementation turns events into `tracing` lines.

use std::time::Duration;

use uuid::Uuid;

use crate::config::OverloadPolicy;

/// Everything the scheduler core reports about itself.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A task was registered and its timer started.
    TaskStarted {
        task: String,
        expression: String,
        used_fallback: bool,
    },
    /// A start for an already-registered identity cancelled and superseded
    /// the previous schedule.
    TaskReplaced { task: String, expression: String },
    /// A task was removed and its future firings cancelled.
    TaskStopped { task: String },
    /// One firing ran to completion on the worker pool.
    FireExecuted {
        task: String,
        run_id: Uuid,
        duration: Duration,
        success: bool,
        error: Option<String>,
    },
    /// A firing was lost to the overload policy.
    SubmissionRejected {
        task: String,
        policy: OverloadPolicy,
    },
    /// Teardown began with this many tasks still registered.
    ShutdownStarted { active_tasks: usize },
    /// Teardown finished; the pool accepts nothing further.
    ShutdownCompleted,
}

/// Receiver for scheduler events.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, event: SchedulerEvent);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::TaskStarted {
                task,
                expression,
                used_fallback,
            } => {
                tracing::info!(%task, %expression, used_fallback, "task started");
            }
            SchedulerEvent::TaskReplaced { task, expression } => {
                tracing::info!(%task, %expression, "task replaced");
            }
            SchedulerEvent::TaskStopped { task } => {
                tracing::info!(%task, "task stopped");
            }
            SchedulerEvent::FireExecuted {
                task,
                run_id,
                duration,
                success,
                error,
            } => {
                if success {
                    tracing::info!(%task, %run_id, ?duration, "task executed");
                } else {
                    tracing::error!(
                        %task,
                        %run_id,
                        ?duration,
                        error = error.as_deref().unwrap_or("unknown"),
                        "task execution failed"
                    );
                }
            }
            SchedulerEvent::SubmissionRejected { task, policy } => {
                tracing::warn!(%task, %policy, "submission rejected by overload policy");
            }
            SchedulerEvent::ShutdownStarted { active_tasks } => {
                tracing::info!(active_tasks, "scheduler shutdown started");
            }
            SchedulerEvent::ShutdownCompleted => {
                tracing::info!("scheduler shutdown completed");
            }
        }
    }
}
