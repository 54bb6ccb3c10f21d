//! Per-task timer loop.
//!
//! One tokio task per live handle. Each iteration computes the next fire
//! instant and races the wait against the handle's cancellation token;
//! cancellation observed before the instant suppresses that firing, while a
//! firing that wins the race is submitted and never retracted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cron::CronTrigger;
use crate::error::PoolError;
use crate::pool::{UnitOfWork, WorkerPool};
use crate::scheduler::handle::TaskIdentity;
use crate::targets::Target;

pub(crate) fn spawn_timer(
    identity: TaskIdentity,
    trigger: CronTrigger,
    target: Arc<dyn Target>,
    pool: Arc<WorkerPool>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let task = identity.task_key();
        // The cursor advances to each fired instant, keeping per-task firings
        // in strictly increasing schedule order.
        let mut after = Utc::now();

        loop {
            let Some(next) = trigger.next_fire_after(after) else {
                // Inert schedule (the never-firing fallback, or one with no
                // remaining instants). Hold the registration until it is
                // stopped or replaced.
                cancel.cancelled().await;
                break;
            };

            let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    let unit = {
                        let target = Arc::clone(&target);
                        let method = identity.method.clone();
                        UnitOfWork::new(task.clone(), async move { target.invoke(&method).await })
                    };
                    match pool.submit(unit).await {
                        Ok(()) => {}
                        Err(PoolError::Saturated) => {
                            // The pool already recorded the rejection; the
                            // firing is lost under the Abort policy.
                            tracing::warn!(%task, "firing rejected by saturated worker pool");
                        }
                        Err(PoolError::ShuttingDown) => break,
                    }
                    after = next;
                }
            }
        }

        tracing::debug!(%task, "timer loop exited");
    })
}
