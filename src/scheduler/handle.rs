//! Task identity and the live handle of a registered task.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Unique key of one schedulable slot: target service name plus the name of
/// the zero-argument operation to fire. Case-sensitive.
///
/// Two starts with the same identity address the same slot regardless of
/// their schedules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity {
    pub service: String,
    pub method: String,
}

impl TaskIdentity {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// The `service.method` key used in logs and sink events.
    pub fn task_key(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

impl std::fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// Lifecycle of a handle. Cancelled is terminal; handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Scheduled,
    Cancelled,
}

/// The live, cancellable record of one registered task.
///
/// Owned by the registry once installed. A schedule or target change is
/// modelled as cancel-old + install-new, never an in-place edit.
#[derive(Debug)]
pub struct TaskHandle {
    identity: TaskIdentity,
    expression: String,
    used_fallback: bool,
    cancel: CancellationToken,
    timer: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn new(
        identity: TaskIdentity,
        expression: String,
        used_fallback: bool,
        cancel: CancellationToken,
        timer: JoinHandle<()>,
    ) -> Self {
        Self {
            identity,
            expression,
            used_fallback,
            cancel,
            timer,
        }
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    /// The effective cron expression this handle fires on.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// True when the original expression was invalid and the never-firing
    /// fallback got installed instead.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Current state, derived from the cancellation token.
    pub fn state(&self) -> TaskState {
        if self.cancel.is_cancelled() {
            TaskState::Cancelled
        } else {
            TaskState::Scheduled
        }
    }

    /// Cancel all future firings. Idempotent; an execution already running
    /// on the pool is never interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the timer loop has exited.
    pub fn is_finished(&self) -> bool {
        self.timer.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_display_is_service_dot_method() {
        let identity = TaskIdentity::new("billing", "sendInvoices");
        assert_eq!(identity.to_string(), "billing.sendInvoices");
        assert_eq!(identity.task_key(), "billing.sendInvoices");
    }

    #[test]
    fn identity_is_case_sensitive() {
        let a = TaskIdentity::new("billing", "sendInvoices");
        let b = TaskIdentity::new("billing", "sendinvoices");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_idempotent() {
        let cancel = CancellationToken::new();
        let timer = tokio::spawn(async {});
        let handle = TaskHandle::new(
            TaskIdentity::new("billing", "sendInvoices"),
            "* * * * * *".to_string(),
            false,
            cancel,
            timer,
        );

        assert_eq!(handle.state(), TaskState::Scheduled);
        handle.cancel();
        assert_eq!(handle.state(), TaskState::Cancelled);
        handle.cancel();
        assert_eq!(handle.state(), TaskState::Cancelled);
    }
}
