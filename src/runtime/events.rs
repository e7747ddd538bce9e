//! Runtime event stream payloads.

use crate::types::{MutationId, NetworkStatus, RetryCount};

/// Events emitted from the queue's single-writer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A mutation was appended.
    Enqueued {
        /// New mutation id.
        id: MutationId,
        /// Its type tag.
        kind: String,
    },
    /// The processor succeeded and the mutation was removed.
    Processed {
        /// Removed mutation id.
        id: MutationId,
    },
    /// The processor failed; the mutation stays at the head.
    Failed {
        /// Head mutation id.
        id: MutationId,
        /// Failed attempts so far.
        retry_count: RetryCount,
        /// Processor error text.
        error: String,
    },
    /// Retry budget exhausted; the mutation was removed without succeeding.
    Dropped {
        /// Dropped mutation id.
        id: MutationId,
        /// Final retry count.
        retry_count: RetryCount,
        /// Last processor error text.
        error: String,
    },
    /// Queue state reached storage.
    Persisted {
        /// Pending mutations written.
        len: usize,
    },
    /// A storage write failed; memory remains authoritative.
    PersistFailed {
        /// Storage error text.
        error: String,
    },
    /// Connectivity belief changed.
    NetworkChanged {
        /// New status.
        status: NetworkStatus,
    },
}
