//! The `Target` trait.

use async_trait::async_trait;

use crate::error::InvocationError;

/// A named bundle of zero-argument operations that scheduled tasks invoke.
///
/// Concrete targets are registered ahead of time in the [`TargetLocator`]
/// under their [`name`](Target::name); a task identity's method string picks
/// the operation at fire time. Implementations must tolerate being invoked
/// repeatedly and concurrently.
///
/// [`TargetLocator`]: crate::targets::TargetLocator
#[async_trait]
pub trait Target: Send + Sync {
    /// Name the locator registers this target under.
    fn name(&self) -> &str;

    /// Human-readable description, logged at registration.
    fn description(&self) -> &str;

    /// Execute the named zero-argument operation.
    async fn invoke(&self, method: &str) -> Result<(), InvocationError>;
}
