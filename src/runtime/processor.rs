//! Capability that executes one mutation against the backend.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::mutation::Mutation;

/// Any processor failure. Every variant consumes one retry attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// Transport or backend failure.
    #[error("processor failed: {0}")]
    Failed(String),
    /// Backend refused the mutation (e.g. validation).
    #[error("backend rejected mutation: {0}")]
    Rejected(String),
    /// The processor panicked.
    #[error("processor panicked")]
    Panicked,
}

impl ProcessorError {
    /// Shorthand for [`ProcessorError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Executes a single mutation.
///
/// Timeouts, if needed, belong inside the implementation; the queue waits for
/// every call to settle.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Performs `mutation` against the backend.
    async fn process(&self, mutation: &Mutation) -> Result<(), ProcessorError>;
}

/// Adapter turning an async closure into a [`Processor`].
pub struct FnProcessor<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(Mutation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessorError>> + Send + 'static,
{
    async fn process(&self, mutation: &Mutation) -> Result<(), ProcessorError> {
        (self.f)(mutation.clone()).await
    }
}

/// Wraps `f` as a shareable processor.
pub fn processor_fn<F, Fut>(f: F) -> Arc<dyn Processor>
where
    F: Fn(Mutation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessorError>> + Send + 'static,
{
    Arc::new(FnProcessor { f })
}
