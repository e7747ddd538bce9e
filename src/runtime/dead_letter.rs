//! Optional receiver for mutations dropped after exhausting retries.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{mutation::Mutation, types::EpochMillis};

/// A mutation removed without ever succeeding.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    /// The dropped mutation, with its final retry count.
    pub mutation: Mutation,
    /// Error from the last attempt.
    pub last_error: String,
    /// When it was dropped.
    pub dropped_at: EpochMillis,
}

/// Sink notified on retry exhaustion.
#[async_trait]
pub trait DeadLetterSink: Send + Sync + 'static {
    /// Receives one dropped mutation. Runs on its own task after the drop
    /// is persisted, so a slow or panicking sink never stalls the queue.
    async fn record(&self, letter: DeadLetter);
}

/// Keeps dropped mutations in memory for the session.
#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetters {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything recorded so far, oldest first.
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.letters.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn record(&self, letter: DeadLetter) {
        self.letters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(letter);
    }
}
