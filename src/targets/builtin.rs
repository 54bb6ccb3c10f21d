//! Built-in targets registered by the binary at startup.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::InvocationError;
use crate::targets::target::Target;

/// Liveness target: logs process uptime. Useful for smoke-testing a freshly
/// deployed scheduler with something like `0/15 * * * * ?`.
pub struct HeartbeatTarget {
    started: Instant,
}

impl HeartbeatTarget {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for HeartbeatTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Target for HeartbeatTarget {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn description(&self) -> &str {
        "logs process uptime on each beat"
    }

    async fn invoke(&self, method: &str) -> Result<(), InvocationError> {
        match method {
            "beat" => {
                tracing::info!(uptime_secs = self.started.elapsed().as_secs(), "heartbeat");
                Ok(())
            }
            other => Err(InvocationError::UnknownMethod {
                target: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}
