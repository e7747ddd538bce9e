use std::future::Future;
use std::pin::Pin;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    codec::{decode_queue, encode_queue},
    core::pending::{FailureDisposition, PendingQueue},
    mutation::{Mutation, MutationKind},
    persist::StorageAdapter,
    types::{MutationId, NetworkStatus, RetryCount},
};

use super::{
    config::QueueConfig,
    dead_letter::{DeadLetter, DeadLetterSink},
    events::QueueEvent,
    processor::{Processor, ProcessorError},
};

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queued in memory, but the storage write failed. It will be persisted
    /// by the next successful write and processed in order.
    #[error("mutation {id} is queued but not yet durable")]
    NotDurable {
        /// Id of the queued mutation.
        id: MutationId,
    },
    /// A typed payload failed to serialize; nothing was queued.
    #[error("mutation payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    /// The queue task has stopped.
    #[error("queue has shut down")]
    Closed,
}

/// Why a `process()` call did not start a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Another drain is running.
    AlreadyDraining,
    /// The network is offline.
    Offline,
    /// No processor is registered.
    NoProcessor,
    /// Nothing is pending.
    Empty,
    /// The head failed recently and its retry window is still open.
    BackingOff {
        /// Time left until the head may be retried.
        ready_in: Duration,
    },
    /// The last state write failed and retrying it failed again.
    PersistPending,
    /// `shutdown()` was requested.
    ShuttingDown,
}

/// The failed attempt that ended a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// The mutation that failed.
    pub id: MutationId,
    /// Its retry count after this failure.
    pub retry_count: RetryCount,
    /// True when the failure exhausted its retries and it was removed.
    pub dropped: bool,
    /// Processor error text.
    pub error: String,
}

/// Summary of one drain, from first attempt until it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Successfully processed mutations, in processing order.
    pub succeeded: Vec<MutationId>,
    /// The failure that ended the drain, if any.
    pub failed: Option<FailedAttempt>,
    /// Why the drain did not continue, when it stopped with work left.
    pub stopped_by: Option<Skip>,
    /// Pending mutations left when the drain stopped.
    pub remaining: usize,
}

/// Result of a `process()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No drain was started.
    Skipped(Skip),
    /// A drain ran and has stopped.
    Completed(DrainReport),
}

/// Optional collaborators beyond storage and config.
#[derive(Clone)]
pub struct QueueHooks {
    /// Source of `createdAt` and `lastAttemptAt` timestamps.
    pub clock: Arc<dyn Clock>,
    /// Receives mutations dropped after exhausting their retries. Called on
    /// its own task once the drop is persisted.
    pub dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl Default for QueueHooks {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            dead_letters: None,
        }
    }
}

type Responder<T> = oneshot::Sender<Result<T, QueueError>>;

/// Completion of a queue command.
///
/// The command is already submitted when this is returned, so dropping it
/// without awaiting neither cancels nor reorders the operation.
pub struct Reply<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Reply<T> {
    fn ready(value: Result<T, QueueError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { rx }
    }
}

impl<T> Future for Reply<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(QueueError::Closed)))
    }
}

enum Command {
    Enqueue {
        kind: String,
        payload: Value,
        resp: Responder<MutationId>,
    },
    SetProcessor {
        processor: Option<Arc<dyn Processor>>,
        resp: Responder<()>,
    },
    SetNetwork {
        status: NetworkStatus,
        resp: Responder<()>,
    },
    Process {
        resp: Responder<DrainOutcome>,
    },
    Idle {
        resp: Responder<()>,
    },
    Pending {
        resp: Responder<Vec<Mutation>>,
    },
    Network {
        resp: Responder<NetworkStatus>,
    },
    Shutdown {
        resp: Responder<()>,
    },
}

struct Settled {
    id: MutationId,
    result: Result<(), ProcessorError>,
}

/// Handle to an offline mutation queue.
///
/// Cheap to clone; every clone talks to the same single-writer task, which is
/// the sole owner of the pending list and of its storage key.
#[derive(Clone)]
pub struct MutationQueue {
    cmd_tx: mpsc::UnboundedSender<Command>,
    events_tx: broadcast::Sender<QueueEvent>,
    len: Arc<AtomicUsize>,
    process_interval: Duration,
}

impl MutationQueue {
    /// Loads persisted state from `storage` and starts the queue.
    ///
    /// A missing key is an empty queue. Unreadable or corrupt state is logged
    /// and replaced by an empty queue; this never fails.
    pub async fn spawn(storage: Arc<dyn StorageAdapter>, config: QueueConfig) -> Self {
        Self::spawn_with(storage, config, QueueHooks::default()).await
    }

    /// Like [`MutationQueue::spawn`] with a custom clock or dead-letter sink.
    ///
    /// Config values that fail [`QueueConfig::validate`] are logged and
    /// replaced by their defaults.
    pub async fn spawn_with(
        storage: Arc<dyn StorageAdapter>,
        config: QueueConfig,
        hooks: QueueHooks,
    ) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!(error = %err, "invalid queue config, falling back to defaults for rejected values");
                config.repaired()
            }
        };
        let pending = load_pending(storage.as_ref(), &config.storage_key).await;
        let len = Arc::new(AtomicUsize::new(pending.len()));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel::<Settled>();
        let (events_tx, _) = broadcast::channel::<QueueEvent>(config.events_capacity);

        let handle = Self {
            cmd_tx,
            events_tx: events_tx.clone(),
            len: Arc::clone(&len),
            process_interval: config.process_interval,
        };

        let actor = Actor {
            pending,
            storage,
            network: config.initial_network,
            config,
            hooks,
            processor: None,
            in_flight: None,
            dirty: false,
            report: DrainReport::default(),
            drain_waiters: Vec::new(),
            idle_waiters: Vec::new(),
            stopping: false,
            shutdown_waiters: Vec::new(),
            events_tx,
            len,
            settled_tx,
        };
        tokio::spawn(actor.run(cmd_rx, settled_rx));

        handle
    }

    /// Subscribes to queue events. Slow receivers lag rather than block.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events_tx.subscribe()
    }

    /// Appends a mutation. Resolves once it is durable.
    ///
    /// If online, a drain is attempted afterwards.
    pub fn enqueue(&self, kind: impl Into<String>, payload: Value) -> Reply<MutationId> {
        let kind = kind.into();
        self.request(|resp| Command::Enqueue {
            kind,
            payload,
            resp,
        })
    }

    /// Appends a typed mutation.
    pub fn enqueue_typed<K: MutationKind>(&self, value: &K) -> Reply<MutationId> {
        match value.to_payload() {
            Ok(payload) => self.enqueue(value.kind(), payload),
            Err(err) => Reply::ready(Err(QueueError::Encode(err))),
        }
    }

    /// Registers the processor; the last registration wins.
    pub fn set_processor(&self, processor: Arc<dyn Processor>) -> Reply<()> {
        self.request(|resp| Command::SetProcessor {
            processor: Some(processor),
            resp,
        })
    }

    /// Unregisters the processor. An in-flight call still settles.
    pub fn clear_processor(&self) -> Reply<()> {
        self.request(|resp| Command::SetProcessor {
            processor: None,
            resp,
        })
    }

    /// Updates connectivity. Going online starts a drain; going offline lets
    /// an in-flight call finish but starts nothing new.
    pub fn set_network_status(&self, status: NetworkStatus) -> Reply<()> {
        self.request(|resp| Command::SetNetwork { status, resp })
    }

    /// Drains from the head until the queue empties, an attempt fails, or a
    /// gate closes. Resolves when that drain stops, or immediately when it is
    /// skipped.
    pub fn process(&self) -> Reply<DrainOutcome> {
        self.request(|resp| Command::Process { resp })
    }

    /// Resolves once no drain is active.
    pub fn idle(&self) -> Reply<()> {
        self.request(|resp| Command::Idle { resp })
    }

    /// Pending mutations, oldest first.
    pub fn pending(&self) -> Reply<Vec<Mutation>> {
        self.request(|resp| Command::Pending { resp })
    }

    /// Current connectivity as seen by the queue.
    pub fn network_status(&self) -> Reply<NetworkStatus> {
        self.request(|resp| Command::Network { resp })
    }

    /// Number of pending mutations. Exact as of the last completed command.
    pub fn queue_length(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    /// Advisory interval for host-driven `process()` triggers.
    pub fn process_interval(&self) -> Duration {
        self.process_interval
    }

    /// Waits for any in-flight call to settle, persists, and stops the queue.
    pub fn shutdown(&self) -> Reply<()> {
        self.request(|resp| Command::Shutdown { resp })
    }

    fn request<T>(&self, make: impl FnOnce(Responder<T>) -> Command) -> Reply<T> {
        let (tx, rx) = oneshot::channel();
        // A closed actor drops the responder, which the reply reports as Closed.
        let _ = self.cmd_tx.send(make(tx));
        Reply { rx }
    }
}

async fn load_pending(storage: &dyn StorageAdapter, key: &str) -> PendingQueue {
    let raw = match storage.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return PendingQueue::new(),
        Err(err) => {
            error!(key, error = %err, "failed to load offline queue, starting empty");
            return PendingQueue::new();
        }
    };

    match decode_queue(&raw) {
        Ok(mutations) => {
            info!(key, pending = mutations.len(), "loaded offline queue");
            PendingQueue::from_mutations(mutations)
        }
        Err(err) => {
            error!(key, error = %err, "corrupt offline queue state, starting empty");
            PendingQueue::new()
        }
    }
}

struct Actor {
    pending: PendingQueue,
    storage: Arc<dyn StorageAdapter>,
    config: QueueConfig,
    hooks: QueueHooks,
    network: NetworkStatus,
    processor: Option<Arc<dyn Processor>>,
    in_flight: Option<MutationId>,
    dirty: bool,
    report: DrainReport,
    drain_waiters: Vec<Responder<DrainOutcome>>,
    idle_waiters: Vec<Responder<()>>,
    stopping: bool,
    shutdown_waiters: Vec<Responder<()>>,
    events_tx: broadcast::Sender<QueueEvent>,
    len: Arc<AtomicUsize>,
    settled_tx: mpsc::UnboundedSender<Settled>,
}

impl Actor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut settled_rx: mpsc::UnboundedReceiver<Settled>,
    ) {
        let mut handles_open = true;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv(), if handles_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        handles_open = false;
                        self.stopping = true;
                    }
                },
                Some(settled) = settled_rx.recv() => self.on_settled(settled).await,
                else => break,
            }

            if self.stopping && self.in_flight.is_none() {
                break;
            }
        }

        if self.dirty {
            self.persist().await;
        }
        self.finish_drain(Some(Skip::ShuttingDown));
        info!(pending = self.pending.len(), "offline queue stopped");
        for resp in self.shutdown_waiters.drain(..) {
            let _ = resp.send(Ok(()));
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue {
                kind,
                payload,
                resp,
            } => {
                let now = self.hooks.clock.now_ms();
                let mutation = self.pending.push(kind, payload, now);
                self.sync_len();
                debug!(mutation_id = %mutation.id, kind = %mutation.kind, "enqueued mutation");
                self.emit(QueueEvent::Enqueued {
                    id: mutation.id,
                    kind: mutation.kind,
                });

                let out = if self.persist().await {
                    Ok(mutation.id)
                } else {
                    Err(QueueError::NotDurable { id: mutation.id })
                };
                let _ = resp.send(out);

                if self.network.is_online() {
                    self.trigger_drain("enqueue").await;
                }
            }
            Command::SetProcessor { processor, resp } => {
                self.processor = processor;
                let _ = resp.send(Ok(()));
            }
            Command::SetNetwork { status, resp } => {
                let prev = self.network;
                self.network = status;
                if prev != status {
                    info!(%prev, %status, "network status changed");
                    self.emit(QueueEvent::NetworkChanged { status });
                }
                let _ = resp.send(Ok(()));

                if !prev.is_online() && status.is_online() {
                    self.trigger_drain("network online").await;
                }
            }
            Command::Process { resp } => match self.start_drain().await {
                Ok(()) => self.drain_waiters.push(resp),
                Err(skip) => {
                    let _ = resp.send(Ok(DrainOutcome::Skipped(skip)));
                }
            },
            Command::Idle { resp } => {
                if self.in_flight.is_some() {
                    self.idle_waiters.push(resp);
                } else {
                    let _ = resp.send(Ok(()));
                }
            }
            Command::Pending { resp } => {
                let _ = resp.send(Ok(self.pending.to_vec()));
            }
            Command::Network { resp } => {
                let _ = resp.send(Ok(self.network));
            }
            Command::Shutdown { resp } => {
                self.stopping = true;
                self.shutdown_waiters.push(resp);
            }
        }
    }

    async fn trigger_drain(&mut self, reason: &'static str) {
        if let Err(skip) = self.start_drain().await {
            debug!(reason, ?skip, "drain not started");
        }
    }

    /// Starts processing the head unless a gate is closed.
    async fn start_drain(&mut self) -> Result<(), Skip> {
        if self.in_flight.is_some() {
            return Err(Skip::AlreadyDraining);
        }
        self.check_gates().await?;
        self.dispatch_head()
    }

    async fn check_gates(&mut self) -> Result<(), Skip> {
        if self.stopping {
            return Err(Skip::ShuttingDown);
        }
        if !self.network.is_online() {
            return Err(Skip::Offline);
        }
        if self.processor.is_none() {
            return Err(Skip::NoProcessor);
        }
        let Some(head) = self.pending.head() else {
            return Err(Skip::Empty);
        };
        if let Some(ready_at) = self.config.backoff.ready_at(head) {
            let now = self.hooks.clock.now_ms();
            if ready_at > now {
                return Err(Skip::BackingOff {
                    ready_in: Duration::from_millis(ready_at - now),
                });
            }
        }
        if self.dirty && !self.persist().await {
            return Err(Skip::PersistPending);
        }
        Ok(())
    }

    fn dispatch_head(&mut self) -> Result<(), Skip> {
        let Some(processor) = self.processor.clone() else {
            return Err(Skip::NoProcessor);
        };
        let Some(mutation) = self.pending.head().cloned() else {
            return Err(Skip::Empty);
        };

        let id = mutation.id;
        self.in_flight = Some(id);
        debug!(mutation_id = %id, kind = %mutation.kind, retry_count = mutation.retry_count, "processing mutation");

        let settled_tx = self.settled_tx.clone();
        tokio::spawn(async move {
            let call = tokio::spawn(async move { processor.process(&mutation).await });
            let result = match call.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => Err(ProcessorError::Panicked),
                Err(err) => Err(ProcessorError::Failed(format!("processor task aborted: {err}"))),
            };
            let _ = settled_tx.send(Settled { id, result });
        });
        Ok(())
    }

    async fn on_settled(&mut self, settled: Settled) {
        if self.in_flight != Some(settled.id) {
            warn!(mutation_id = %settled.id, "ignoring settlement for a mutation not in flight");
            return;
        }
        self.in_flight = None;

        match settled.result {
            Ok(()) => {
                if self.pending.complete_head(settled.id).is_some() {
                    info!(mutation_id = %settled.id, "mutation processed");
                    self.report.succeeded.push(settled.id);
                    self.emit(QueueEvent::Processed { id: settled.id });
                }
                self.sync_len();
                self.persist().await;

                if self.pending.is_empty() {
                    self.finish_drain(None);
                    return;
                }
                match self.check_gates().await.and_then(|()| self.dispatch_head()) {
                    Ok(()) => {}
                    Err(skip) => self.finish_drain(Some(skip)),
                }
            }
            Err(err) => {
                let letter = self.record_failure(settled.id, err);
                self.sync_len();
                self.persist().await;
                self.finish_drain(None);
                if let Some(letter) = letter {
                    self.dispatch_dead_letter(letter);
                }
            }
        }
    }

    /// Applies a failed attempt to the head. Returns the dead letter to hand
    /// to the sink when the mutation was dropped.
    fn record_failure(&mut self, id: MutationId, err: ProcessorError) -> Option<DeadLetter> {
        let now = self.hooks.clock.now_ms();
        let max_retries = self.config.max_retries();
        let error = err.to_string();

        match self.pending.fail_head(id, max_retries, now) {
            Some(FailureDisposition::Retained { id, retry_count }) => {
                warn!(mutation_id = %id, retry_count, max_retries, error = %error, "mutation failed, will retry");
                self.emit(QueueEvent::Failed {
                    id,
                    retry_count,
                    error: error.clone(),
                });
                self.report.failed = Some(FailedAttempt {
                    id,
                    retry_count,
                    dropped: false,
                    error,
                });
                None
            }
            Some(FailureDisposition::Dropped(mutation)) => {
                let retry_count = mutation.retry_count;
                error!(
                    mutation_id = %mutation.id,
                    kind = %mutation.kind,
                    retry_count,
                    error = %error,
                    "mutation exhausted retries, dropping"
                );
                self.emit(QueueEvent::Dropped {
                    id: mutation.id,
                    retry_count,
                    error: error.clone(),
                });
                self.report.failed = Some(FailedAttempt {
                    id: mutation.id,
                    retry_count,
                    dropped: true,
                    error: error.clone(),
                });
                Some(DeadLetter {
                    mutation,
                    last_error: error,
                    dropped_at: now,
                })
            }
            None => {
                warn!(mutation_id = %id, "failed mutation is no longer at the head");
                None
            }
        }
    }

    /// Hands a dropped mutation to the sink on its own task. The actor never
    /// waits on the sink, and a panicking sink only loses that one letter.
    fn dispatch_dead_letter(&self, letter: DeadLetter) {
        let Some(sink) = self.hooks.dead_letters.clone() else {
            return;
        };
        let id = letter.mutation.id;
        tokio::spawn(async move {
            let joined = tokio::spawn(async move { sink.record(letter).await }).await;
            if let Err(err) = joined {
                if err.is_panic() {
                    error!(mutation_id = %id, "dead-letter sink panicked");
                } else {
                    warn!(mutation_id = %id, error = %err, "dead-letter sink task cancelled");
                }
            }
        });
    }

    fn finish_drain(&mut self, stopped_by: Option<Skip>) {
        let mut report = std::mem::take(&mut self.report);
        report.stopped_by = stopped_by;
        report.remaining = self.pending.len();

        for resp in self.drain_waiters.drain(..) {
            let _ = resp.send(Ok(DrainOutcome::Completed(report.clone())));
        }
        for resp in self.idle_waiters.drain(..) {
            let _ = resp.send(Ok(()));
        }
    }

    /// Writes the full pending list. On failure memory stays authoritative
    /// and the write is retried by the next mutating operation.
    async fn persist(&mut self) -> bool {
        let key = self.config.storage_key.as_str();
        let result = if self.pending.is_empty() {
            self.storage.delete(key).await.map_err(|e| e.to_string())
        } else {
            match encode_queue(self.pending.iter()) {
                Ok(raw) => self.storage.set(key, &raw).await.map_err(|e| e.to_string()),
                Err(err) => Err(err.to_string()),
            }
        };

        match result {
            Ok(()) => {
                if self.dirty {
                    info!(pending = self.pending.len(), "offline queue persisted after earlier failure");
                }
                self.dirty = false;
                self.emit(QueueEvent::Persisted {
                    len: self.pending.len(),
                });
                true
            }
            Err(error) => {
                warn!(pending = self.pending.len(), error = %error, "failed to persist offline queue");
                self.dirty = true;
                self.emit(QueueEvent::PersistFailed { error });
                false
            }
        }
    }

    fn sync_len(&self) {
        self.len.store(self.pending.len(), Ordering::SeqCst);
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events_tx.send(event);
    }
}
