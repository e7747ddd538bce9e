//! In-memory queue state and retry accounting.

/// FIFO of pending mutations with retry accounting.
pub mod pending;
