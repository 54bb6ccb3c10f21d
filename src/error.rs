//! Error types for the task scheduler.

/// Top-level error type for the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Start error: {0}")]
    Start(#[from] StartError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Target resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("No target registered under name {name}")]
    NotFound { name: String },
}

/// Errors raised by a target when one of its operations is invoked.
///
/// These never escape the worker pool's execution wrapper; they are timed,
/// logged and recorded to the observability sink.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Target {target} has no operation named {method}")]
    UnknownMethod { target: String, method: String },

    #[error("Target {target} failed: {reason}")]
    Failed { target: String, reason: String },
}

/// Worker pool submission errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// All execution slots busy and the queue full, under the `Abort` policy.
    #[error("Worker pool saturated, submission rejected")]
    Saturated,

    #[error("Worker pool is shutting down")]
    ShuttingDown,
}

/// Errors returned by `TaskRegistry::start`.
///
/// An invalid cron expression is deliberately absent here: it degrades to the
/// never-firing fallback schedule and is reported through `StartAck`.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Target resolution failed: {0}")]
    Resolution(#[from] LocatorError),

    #[error("Scheduler is shutting down, no new tasks accepted")]
    ShuttingDown,
}

/// Result type alias for the scheduler.
pub type Result<T> = std::result::Result<T, Error>;
