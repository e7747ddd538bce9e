//! Single-writer async queue runtime, its configuration, and collaborators.

/// Retry pacing policies.
pub mod backoff;
/// Queue configuration and loading.
pub mod config;
/// Dead-letter sink for exhausted mutations.
pub mod dead_letter;
/// Periodic host-side drain trigger.
pub mod driver;
/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
/// Processor contract.
pub mod processor;
