//! Configuration types.
//!
//! All knobs come from `TASK_SCHEDULER_*` environment variables with sensible
//! defaults, so the binary runs unconfigured in development.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// What the worker pool does with a submission when every execution slot is
/// busy and the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadPolicy {
    /// The submitting context runs the work itself. Back-pressure: the
    /// scheduler loop for that one task is blocked for the duration, and no
    /// firing is ever silently lost.
    CallerRuns,
    /// The submission fails with [`crate::error::PoolError::Saturated`];
    /// the firing is lost and the caller must log it.
    Abort,
    /// The new unit is dropped silently; the firing is lost.
    Discard,
    /// The oldest queued (not yet running) unit is evicted to make room.
    DiscardOldest,
}

impl Default for OverloadPolicy {
    fn default() -> Self {
        Self::CallerRuns
    }
}

impl std::fmt::Display for OverloadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CallerRuns => "CALLER_RUNS",
            Self::Abort => "ABORT",
            Self::Discard => "DISCARD",
            Self::DiscardOldest => "DISCARD_OLDEST",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OverloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALLER_RUNS" => Ok(Self::CallerRuns),
            "ABORT" => Ok(Self::Abort),
            "DISCARD" => Ok(Self::Discard),
            "DISCARD_OLDEST" => Ok(Self::DiscardOldest),
            other => Err(format!("unknown overload policy: {other}")),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrent execution slots in the worker pool.
    pub pool_size: usize,
    /// Prefix for worker labels in log output. Cosmetic only.
    pub thread_name_prefix: String,
    /// Maximum buffered-but-not-yet-running submissions.
    pub queue_capacity: usize,
    /// How long an idle worker lingers before its slot is reclaimed.
    pub keep_alive: Duration,
    /// Policy applied when the pool is saturated at submission time.
    pub overload_policy: OverloadPolicy,
    /// Whether shutdown waits for in-flight executions to finish.
    pub wait_on_shutdown: bool,
    /// Upper bound on how long shutdown waits before abandoning work.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            thread_name_prefix: "task-scheduler-".to_string(),
            queue_capacity: 16,
            keep_alive: Duration::from_secs(60),
            overload_policy: OverloadPolicy::default(),
            wait_on_shutdown: true,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Load the configuration from `TASK_SCHEDULER_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            pool_size: env_parse("TASK_SCHEDULER_POOL_SIZE", defaults.pool_size)?,
            thread_name_prefix: std::env::var("TASK_SCHEDULER_THREAD_NAME_PREFIX")
                .unwrap_or(defaults.thread_name_prefix),
            queue_capacity: env_parse("TASK_SCHEDULER_QUEUE_CAPACITY", defaults.queue_capacity)?,
            keep_alive: Duration::from_secs(env_parse(
                "TASK_SCHEDULER_KEEP_ALIVE_SECONDS",
                defaults.keep_alive.as_secs(),
            )?),
            overload_policy: env_parse(
                "TASK_SCHEDULER_REJECTED_POLICY",
                defaults.overload_policy,
            )?,
            wait_on_shutdown: env_parse(
                "TASK_SCHEDULER_WAIT_ON_SHUTDOWN",
                defaults.wait_on_shutdown,
            )?,
            shutdown_timeout: Duration::from_secs(env_parse(
                "TASK_SCHEDULER_SHUTDOWN_TIMEOUT_SECONDS",
                defaults.shutdown_timeout.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pool cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASK_SCHEDULER_POOL_SIZE".to_string(),
                message: "pool size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse an environment variable, returning `default` when it is unset.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
