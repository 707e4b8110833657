/// alertcast - multi-channel alert notification dispatcher
///
/// This library turns health-state changes of monitored services into
/// notifications on the console, by email, as PagerDuty incidents and as
/// Slack webhook messages.
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod dns;
pub mod handlers;
pub mod retry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
