//! Bounded worker pool with a pluggable overload policy.
//!
//! Workers are tokio tasks, spawned on demand up to `pool_size` and reclaimed
//! after `keep_alive` of idleness. Submissions that find every slot busy go
//! to a bounded queue; once that is full the configured [`OverloadPolicy`]
//! decides what gives.
//!
//! Every unit is executed through a wrapper that times it and contains any
//! error or panic, so one misbehaving job can never take down the pool or
//! the scheduler driving it.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{OverloadPolicy, SchedulerConfig};
use crate::error::{InvocationError, PoolError};
use crate::observe::{ObservabilitySink, SchedulerEvent};

type WorkFuture = Pin<Box<dyn Future<Output = Result<(), InvocationError>> + Send>>;

/// One labelled firing, ready to run.
pub struct UnitOfWork {
    label: String,
    work: WorkFuture,
}

impl UnitOfWork {
    pub fn new(
        label: impl Into<String>,
        work: impl Future<Output = Result<(), InvocationError>> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            work: Box::pin(work),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Queue and worker bookkeeping, guarded together so a worker can only give
/// its slot back while the queue is provably empty.
struct PoolState {
    queue: VecDeque<UnitOfWork>,
    workers: usize,
    spawned: u64,
}

struct PoolShared {
    config: SchedulerConfig,
    state: Mutex<PoolState>,
    /// Wakes one idle worker when a unit lands in the queue.
    wakeup: Notify,
    accepting: AtomicBool,
    sink: Arc<dyn ObservabilitySink>,
}

/// Outcome of the admission check, resolved under the state lock.
enum Admission {
    Spawn { seq: u64, unit: UnitOfWork },
    Queued,
    EvictOldest { evicted: Option<UnitOfWork> },
    RunInline(UnitOfWork),
    Reject(String),
    Drop(String),
}

/// Bounded execution slots with a work queue and an overload policy.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(config: SchedulerConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    spawned: 0,
                }),
                wakeup: Notify::new(),
                accepting: AtomicBool::new(true),
                sink,
            }),
        }
    }

    /// Submit a unit for execution.
    ///
    /// Returns `Ok` when the unit was admitted (spawned, queued, run inline
    /// under `CallerRuns`, or dropped under the discard policies — those are
    /// silent by design and only visible through the sink).
    /// `Err(PoolError::Saturated)` only occurs under the `Abort` policy.
    pub async fn submit(&self, unit: UnitOfWork) -> Result<(), PoolError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }

        let admission = {
            let mut state = self.shared.state.lock().expect("pool state lock poisoned");
            if state.workers < self.shared.config.pool_size {
                state.workers += 1;
                state.spawned += 1;
                Admission::Spawn {
                    seq: state.spawned,
                    unit,
                }
            } else if state.queue.len() < self.shared.config.queue_capacity {
                state.queue.push_back(unit);
                Admission::Queued
            } else {
                match self.shared.config.overload_policy {
                    OverloadPolicy::CallerRuns => Admission::RunInline(unit),
                    OverloadPolicy::Abort => Admission::Reject(unit.label),
                    OverloadPolicy::Discard => Admission::Drop(unit.label),
                    OverloadPolicy::DiscardOldest => {
                        let evicted = state.queue.pop_front();
                        state.queue.push_back(unit);
                        Admission::EvictOldest { evicted }
                    }
                }
            }
        };

        match admission {
            Admission::Spawn { seq, unit } => {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(worker_loop(shared, seq, unit));
                Ok(())
            }
            Admission::Queued => {
                self.shared.wakeup.notify_one();
                Ok(())
            }
            Admission::EvictOldest { evicted } => {
                if let Some(old) = evicted {
                    self.shared.sink.record(SchedulerEvent::SubmissionRejected {
                        task: old.label.clone(),
                        policy: OverloadPolicy::DiscardOldest,
                    });
                    tracing::warn!(task = %old.label, "evicted oldest queued unit to make room");
                }
                self.shared.wakeup.notify_one();
                Ok(())
            }
            Admission::RunInline(unit) => {
                tracing::debug!(task = %unit.label, "pool saturated, running in submitting context");
                execute(&self.shared, unit).await;
                Ok(())
            }
            Admission::Reject(label) => {
                self.shared.sink.record(SchedulerEvent::SubmissionRejected {
                    task: label,
                    policy: OverloadPolicy::Abort,
                });
                Err(PoolError::Saturated)
            }
            Admission::Drop(label) => {
                self.shared.sink.record(SchedulerEvent::SubmissionRejected {
                    task: label,
                    policy: OverloadPolicy::Discard,
                });
                Ok(())
            }
        }
    }

    /// Stop accepting submissions and wind the pool down.
    ///
    /// With `wait_on_shutdown`, waits up to `shutdown_timeout` for workers to
    /// drain the queue and finish in-flight units; anything still queued
    /// after the deadline is abandoned. Without it, the queue is cleared
    /// immediately. In-flight executions are never interrupted either way.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if !self.shared.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.wakeup.notify_waiters();

        if self.shared.config.wait_on_shutdown {
            let drained = tokio::time::timeout(self.shared.config.shutdown_timeout, async {
                loop {
                    let workers = {
                        self.shared
                            .state
                            .lock()
                            .expect("pool state lock poisoned")
                            .workers
                    };
                    if workers == 0 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await;

            if drained.is_err() {
                let abandoned = self.clear_queue();
                tracing::warn!(abandoned, "pool shutdown timed out, abandoning queued work");
            }
        } else {
            let abandoned = self.clear_queue();
            if abandoned > 0 {
                tracing::warn!(abandoned, "pool shutdown abandoned queued work");
            }
        }
        tracing::debug!("worker pool shut down");
    }

    fn clear_queue(&self) -> usize {
        let mut state = self.shared.state.lock().expect("pool state lock poisoned");
        let abandoned = state.queue.len();
        state.queue.clear();
        abandoned
    }

    /// Whether submissions are still accepted.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Units waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("pool state lock poisoned")
            .queue
            .len()
    }

    /// Live worker tasks, idle lingerers included.
    pub fn workers(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("pool state lock poisoned")
            .workers
    }
}

/// One worker slot: run the seed unit, then drain the queue, lingering
/// `keep_alive` between units before giving the slot back.
async fn worker_loop(shared: Arc<PoolShared>, seq: u64, first: UnitOfWork) {
    let worker = format!("{}{}", shared.config.thread_name_prefix, seq);
    tracing::debug!(%worker, "worker started");

    let mut current = Some(first);
    loop {
        if let Some(unit) = current.take() {
            execute(&shared, unit).await;
        }

        current = {
            shared
                .state
                .lock()
                .expect("pool state lock poisoned")
                .queue
                .pop_front()
        };
        if current.is_some() {
            continue;
        }

        if !shared.accepting.load(Ordering::SeqCst) {
            if exit_if_idle(&shared) {
                break;
            }
            continue;
        }

        let woken = tokio::time::timeout(shared.config.keep_alive, shared.wakeup.notified()).await;
        if woken.is_err() && exit_if_idle(&shared) {
            break;
        }
    }

    tracing::debug!(%worker, "worker stopped");
}

/// Give the slot back, but only while the queue is provably empty.
fn exit_if_idle(shared: &PoolShared) -> bool {
    let mut state = shared.state.lock().expect("pool state lock poisoned");
    if state.queue.is_empty() {
        state.workers -= 1;
        true
    } else {
        false
    }
}

/// Execution wrapper: time the unit, contain errors and panics, report to
/// the sink. Nothing propagates out of here.
async fn execute(shared: &PoolShared, unit: UnitOfWork) {
    let UnitOfWork { label, work } = unit;
    let run_id = Uuid::new_v4();
    let started = Instant::now();

    let outcome = AssertUnwindSafe(work).catch_unwind().await;
    let duration = started.elapsed();

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            Some(format!("panicked: {reason}"))
        }
    };

    match &error {
        None => tracing::info!(task = %label, %run_id, ?duration, "task executed"),
        Some(reason) => {
            tracing::error!(task = %label, %run_id, ?duration, error = %reason, "task execution failed");
        }
    }

    shared.sink.record(SchedulerEvent::FireExecuted {
        task: label,
        run_id,
        duration,
        success: error.is_none(),
        error,
    });
}
