//! Target abstraction: the invokable work a scheduled task fires.

pub mod builtin;
pub mod locator;
pub mod target;

pub use locator::TargetLocator;
pub use target::Target;
