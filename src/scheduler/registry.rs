//! The task registry: start/stop/replace protocol over live handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cron::CronTrigger;
use crate::error::StartError;
use crate::observe::{ObservabilitySink, SchedulerEvent};
use crate::pool::WorkerPool;
use crate::scheduler::handle::{TaskHandle, TaskIdentity, TaskState};
use crate::scheduler::timer::spawn_timer;
use crate::targets::TargetLocator;

/// What a successful start tells the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAck {
    /// The effective cron expression: the caller's, or the never-firing
    /// fallback when the input did not parse.
    pub accepted_schedule_expr: String,
    /// True when the fallback was installed.
    pub used_fallback: bool,
    /// True when this start cancelled and superseded a previous registration
    /// of the same identity.
    pub replaced: bool,
}

/// Outcome of a stop. Stopping an unknown identity is benign, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAck {
    pub found: bool,
}

/// Concurrent mapping from task identity to its live handle.
///
/// At most one active schedule per identity: a second start for the same
/// identity atomically cancels and replaces the first. Calls on the same
/// identity are totally ordered by the map's per-entry lock; calls on
/// different identities do not contend with each other.
pub struct TaskRegistry {
    tasks: DashMap<TaskIdentity, TaskHandle>,
    locator: Arc<TargetLocator>,
    pool: Arc<WorkerPool>,
    sink: Arc<dyn ObservabilitySink>,
    accepting: AtomicBool,
}

impl TaskRegistry {
    pub fn new(
        locator: Arc<TargetLocator>,
        pool: Arc<WorkerPool>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            tasks: DashMap::new(),
            locator,
            pool,
            sink,
            accepting: AtomicBool::new(true),
        }
    }

    /// Register a task, replacing any previous schedule for the same
    /// identity.
    ///
    /// An unparseable cron expression does not fail the call: the task is
    /// installed with the never-firing fallback and `used_fallback` set, so
    /// the registration is never lost to a typo. Target resolution failure
    /// does fail the call and leaves the registry untouched — the previous
    /// schedule, if any, keeps running.
    pub async fn start(
        &self,
        identity: TaskIdentity,
        schedule_expr: &str,
    ) -> Result<StartAck, StartError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(StartError::ShuttingDown);
        }

        let trigger = CronTrigger::parse(schedule_expr);
        if trigger.used_fallback() {
            tracing::warn!(
                task = %identity,
                expression = schedule_expr,
                fallback = trigger.expression(),
                "invalid cron expression, task registered with never-firing fallback"
            );
        }

        // Resolve before touching the map so a resolution failure cannot
        // disturb an existing registration.
        let target = self.locator.resolve(&identity.service).await?;

        let cancel = CancellationToken::new();
        let timer = spawn_timer(
            identity.clone(),
            trigger.clone(),
            target,
            Arc::clone(&self.pool),
            cancel.clone(),
        );
        let handle = TaskHandle::new(
            identity.clone(),
            trigger.expression().to_string(),
            trigger.used_fallback(),
            cancel,
            timer,
        );

        // The entry holds this identity's shard lock, making cancel-old +
        // install-new indivisible with respect to concurrent calls on the
        // same identity.
        let replaced = match self.tasks.entry(identity.clone()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(handle);
                previous.cancel();
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
                false
            }
        };

        // A shutdown that raced us between the gate check and the insert has
        // already drained the map; take the registration back out.
        if !self.accepting.load(Ordering::SeqCst) {
            if let Some((_, handle)) = self.tasks.remove(&identity) {
                handle.cancel();
            }
            return Err(StartError::ShuttingDown);
        }

        let event = if replaced {
            tracing::info!(task = %identity, expression = trigger.expression(), "task replaced");
            SchedulerEvent::TaskReplaced {
                task: identity.task_key(),
                expression: trigger.expression().to_string(),
            }
        } else {
            tracing::info!(task = %identity, expression = trigger.expression(), "task started");
            SchedulerEvent::TaskStarted {
                task: identity.task_key(),
                expression: trigger.expression().to_string(),
                used_fallback: trigger.used_fallback(),
            }
        };
        self.sink.record(event);

        Ok(StartAck {
            accepted_schedule_expr: trigger.expression().to_string(),
            used_fallback: trigger.used_fallback(),
            replaced,
        })
    }

    /// Remove a task and cancel its future firings.
    ///
    /// An execution already running on the pool is not interrupted. Unknown
    /// identities report `found: false`.
    pub fn stop(&self, identity: &TaskIdentity) -> StopAck {
        match self.tasks.remove(identity) {
            Some((_, handle)) => {
                handle.cancel();
                tracing::info!(task = %identity, "task stopped");
                self.sink.record(SchedulerEvent::TaskStopped {
                    task: identity.task_key(),
                });
                StopAck { found: true }
            }
            None => {
                tracing::warn!(task = %identity, "no task to stop");
                StopAck { found: false }
            }
        }
    }

    /// Cancel every task and wind the worker pool down. Idempotent; called
    /// once at process teardown.
    pub async fn shutdown_all(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }

        let identities: Vec<TaskIdentity> =
            self.tasks.iter().map(|entry| entry.key().clone()).collect();
        self.sink.record(SchedulerEvent::ShutdownStarted {
            active_tasks: identities.len(),
        });

        let mut cancelled = 0usize;
        for identity in identities {
            // remove() is atomic per key, so a stop racing this drain cannot
            // make us cancel a handle twice.
            if let Some((_, handle)) = self.tasks.remove(&identity) {
                handle.cancel();
                cancelled += 1;
            }
        }

        self.pool.shutdown().await;
        self.sink.record(SchedulerEvent::ShutdownCompleted);
        tracing::info!(cancelled, "all scheduled tasks cancelled");
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether an identity currently has a live schedule.
    pub fn contains(&self, identity: &TaskIdentity) -> bool {
        self.tasks.contains_key(identity)
    }

    /// Registered identities, in no particular order.
    pub fn list(&self) -> Vec<TaskIdentity> {
        self.tasks.iter().map(|entry| entry.key().clone()).collect()
    }

    /// State of a registered handle, if any. Always `Scheduled` while the
    /// handle is reachable here; cancellation and removal happen together.
    pub fn state(&self, identity: &TaskIdentity) -> Option<TaskState> {
        self.tasks.get(identity).map(|handle| handle.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::cron::NEVER_CRON;
    use crate::error::InvocationError;
    use crate::targets::Target;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct CountingTarget {
        name: String,
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Target for CountingTarget {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "counts invocations"
        }
        async fn invoke(&self, _method: &str) -> Result<(), InvocationError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SchedulerEvent>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<SchedulerEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ObservabilitySink for RecordingSink {
        fn record(&self, event: SchedulerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    async fn harness() -> (Arc<TaskRegistry>, Arc<AtomicUsize>, Arc<RecordingSink>) {
        let invocations = Arc::new(AtomicUsize::new(0));
        let locator = Arc::new(TargetLocator::new());
        locator
            .register(Arc::new(CountingTarget {
                name: "billing".to_string(),
                invocations: Arc::clone(&invocations),
            }))
            .await;

        let sink = Arc::new(RecordingSink::default());
        let pool = Arc::new(WorkerPool::new(
            SchedulerConfig::default(),
            sink.clone() as Arc<dyn ObservabilitySink>,
        ));
        let registry = Arc::new(TaskRegistry::new(
            locator,
            pool,
            sink.clone() as Arc<dyn ObservabilitySink>,
        ));
        (registry, invocations, sink)
    }

    #[tokio::test]
    async fn start_installs_one_handle() {
        let (registry, _, sink) = harness().await;
        let identity = TaskIdentity::new("billing", "sendInvoices");

        let ack = registry
            .start(identity.clone(), "0/15 * * * * ?")
            .await
            .unwrap();
        assert_eq!(ack.accepted_schedule_expr, "0/15 * * * * ?");
        assert!(!ack.used_fallback);
        assert!(!ack.replaced);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(&identity), Some(TaskState::Scheduled));
        assert!(sink.events().iter().any(|e| {
            matches!(e, SchedulerEvent::TaskStarted { task, used_fallback: false, .. }
                if task == "billing.sendInvoices")
        }));
    }

    #[tokio::test]
    async fn invalid_expression_registers_with_fallback() {
        let (registry, _, _) = harness().await;
        let ack = registry
            .start(TaskIdentity::new("billing", "sendInvoices"), "not-a-cron")
            .await
            .unwrap();

        assert!(ack.used_fallback);
        assert_eq!(ack.accepted_schedule_expr, NEVER_CRON);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unresolvable_target_leaves_registry_unchanged() {
        let (registry, _, _) = harness().await;
        let existing = TaskIdentity::new("billing", "sendInvoices");
        registry
            .start(existing.clone(), "0/15 * * * * ?")
            .await
            .unwrap();

        let err = registry
            .start(TaskIdentity::new("ghost", "walk"), "0/15 * * * * ?")
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::Resolution(_)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(&existing), Some(TaskState::Scheduled));
    }

    #[tokio::test]
    async fn restart_replaces_previous_handle() {
        let (registry, _, sink) = harness().await;
        let identity = TaskIdentity::new("billing", "sendInvoices");

        registry
            .start(identity.clone(), "0/15 * * * * ?")
            .await
            .unwrap();
        let ack = registry
            .start(identity.clone(), "0 0 3 * * *")
            .await
            .unwrap();

        assert!(ack.replaced);
        assert_eq!(registry.len(), 1);
        assert!(sink.events().iter().any(|e| {
            matches!(e, SchedulerEvent::TaskReplaced { task, expression }
                if task == "billing.sendInvoices" && expression == "0 0 3 * * *")
        }));
    }

    #[tokio::test]
    async fn concurrent_starts_converge_to_one_handle() {
        let (registry, _, _) = harness().await;
        let identity = TaskIdentity::new("billing", "sendInvoices");

        let mut joins = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let identity = identity.clone();
            joins.push(tokio::spawn(async move {
                registry.start(identity, "0/15 * * * * ?").await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(&identity), Some(TaskState::Scheduled));
    }

    #[tokio::test]
    async fn stop_unknown_identity_is_benign() {
        let (registry, _, sink) = harness().await;
        let ack = registry.stop(&TaskIdentity::new("billing", "nothing"));
        assert!(!ack.found);
        assert!(registry.is_empty());
        assert!(
            !sink
                .events()
                .iter()
                .any(|e| matches!(e, SchedulerEvent::TaskStopped { .. }))
        );
    }

    #[tokio::test]
    async fn stop_removes_and_cancels() {
        let (registry, _, sink) = harness().await;
        let identity = TaskIdentity::new("billing", "sendInvoices");
        registry
            .start(identity.clone(), "0/15 * * * * ?")
            .await
            .unwrap();

        let ack = registry.stop(&identity);
        assert!(ack.found);
        assert!(registry.is_empty());
        assert!(sink.events().iter().any(|e| {
            matches!(e, SchedulerEvent::TaskStopped { task } if task == "billing.sendInvoices")
        }));
    }

    #[tokio::test]
    async fn shutdown_drains_everything_and_rejects_new_starts() {
        let (registry, _, sink) = harness().await;
        registry
            .start(TaskIdentity::new("billing", "sendInvoices"), "0/15 * * * * ?")
            .await
            .unwrap();
        registry
            .start(TaskIdentity::new("billing", "sendReminders"), "0 0 * * * *")
            .await
            .unwrap();

        registry.shutdown_all().await;
        assert!(registry.is_empty());

        let err = registry
            .start(TaskIdentity::new("billing", "sendInvoices"), "0/15 * * * * ?")
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::ShuttingDown));

        let events = sink.events();
        assert!(events.iter().any(
            |e| matches!(e, SchedulerEvent::ShutdownStarted { active_tasks } if *active_tasks == 2)
        ));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SchedulerEvent::ShutdownCompleted))
        );
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (registry, _, sink) = harness().await;
        registry.shutdown_all().await;
        registry.shutdown_all().await;

        let started = sink
            .events()
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::ShutdownStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }
}
