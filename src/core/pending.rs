//! Pure FIFO of pending mutations. Only the head is ever attempted.

use std::collections::VecDeque;

use serde_json::Value;

use crate::{
    mutation::Mutation,
    types::{EpochMillis, MutationId, RetryCount},
};

/// What happened to the head after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDisposition {
    /// Still at the head, awaiting another attempt.
    Retained {
        /// The head's id.
        id: MutationId,
        /// Failed attempts so far.
        retry_count: RetryCount,
    },
    /// Retry budget exhausted; removed from the queue.
    Dropped(Mutation),
}

/// Authoritative in-memory FIFO of pending mutations with retry accounting.
///
/// Holds no I/O. The runtime owns one of these and persists its
/// [`PendingQueue::iter`] view after every change.
#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    items: VecDeque<Mutation>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a queue from persisted mutations, oldest first.
    pub fn from_mutations(mutations: Vec<Mutation>) -> Self {
        Self {
            items: mutations.into(),
        }
    }

    /// Appends a fresh mutation and returns a copy of it.
    pub fn push(&mut self, kind: String, payload: Value, now_ms: EpochMillis) -> Mutation {
        let mutation = Mutation::new(kind, payload, now_ms);
        self.items.push_back(mutation.clone());
        mutation
    }

    /// The oldest pending mutation, the only one eligible for an attempt.
    pub fn head(&self) -> Option<&Mutation> {
        self.items.front()
    }

    /// Removes the head after a successful attempt.
    ///
    /// `id` guards against completing a mutation that is no longer at the head.
    pub fn complete_head(&mut self, id: MutationId) -> Option<Mutation> {
        if self.items.front().map(|m| m.id) != Some(id) {
            return None;
        }
        self.items.pop_front()
    }

    /// Records one failed attempt on the head.
    ///
    /// Drops the head once `retry_count >= max_retries`.
    pub fn fail_head(
        &mut self,
        id: MutationId,
        max_retries: RetryCount,
        now_ms: EpochMillis,
    ) -> Option<FailureDisposition> {
        let head = self.items.front_mut().filter(|m| m.id == id)?;
        head.retry_count = head.retry_count.saturating_add(1);
        head.last_attempt_at = Some(now_ms);

        if head.retry_count >= max_retries {
            self.items.pop_front().map(FailureDisposition::Dropped)
        } else {
            Some(FailureDisposition::Retained {
                id,
                retry_count: head.retry_count,
            })
        }
    }

    /// Number of pending mutations.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pending mutations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.items.iter()
    }

    /// Cloned snapshot of the pending mutations, oldest first.
    pub fn to_vec(&self) -> Vec<Mutation> {
        self.items.iter().cloned().collect()
    }
}
