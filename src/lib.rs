//! Offline-first mutation queue with pluggable durable storage.
//!
//! Writes made while disconnected are captured as [`mutation::Mutation`]
//! records, persisted through a [`persist::StorageAdapter`], and replayed in
//! strict FIFO order against a [`runtime::processor::Processor`] once the host
//! reports the network as online.
//!
//! # Examples
//!
//! In-memory queue with a closure processor:
//! ```
//! use std::sync::Arc;
//!
//! use mutqueue::{
//!     persist::memory::MemoryStorage,
//!     runtime::{
//!         config::QueueConfig,
//!         handle::MutationQueue,
//!         processor::processor_fn,
//!     },
//!     types::NetworkStatus,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let queue = MutationQueue::spawn(Arc::new(MemoryStorage::new()), QueueConfig::default()).await;
//! queue.set_network_status(NetworkStatus::Offline).await.expect("offline");
//! queue
//!     .enqueue("create_task", serde_json::json!({ "title": "x" }))
//!     .await
//!     .expect("enqueue");
//! assert_eq!(queue.queue_length(), 1);
//!
//! queue.set_processor(processor_fn(|_m| async { Ok(()) })).await.expect("processor");
//! queue.set_network_status(NetworkStatus::Online).await.expect("online");
//! queue.idle().await.expect("idle");
//! assert_eq!(queue.queue_length(), 0);
//! # }
//! ```
//!
//! Durable queue on SQLite:
//! ```no_run
//! use std::sync::Arc;
//!
//! use mutqueue::{
//!     kinds::{AppMutation, NewTask},
//!     persist::sqlite::SqliteStorage,
//!     runtime::{config::QueueConfig, handle::MutationQueue},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let storage = SqliteStorage::open("offline.db").expect("open sqlite");
//! let queue = MutationQueue::spawn(Arc::new(storage), QueueConfig::default()).await;
//! let _id = queue
//!     .enqueue_typed(&AppMutation::CreateTask(NewTask {
//!         id: "t-1".to_string(),
//!         title: "write report".to_string(),
//!         due_at: None,
//!     }))
//!     .await
//!     .expect("enqueue");
//! queue.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Testable wall clock.
pub mod clock;
/// Persisted queue-state envelope.
pub mod codec;
/// In-memory queue state.
pub mod core;
/// Typed mutation variants for the app.
pub mod kinds;
/// Mutation record and typed-payload bridge.
pub mod mutation;
/// Storage abstraction with memory and SQLite implementations.
pub mod persist;
/// Single-writer queue runtime.
pub mod runtime;
/// Shared primitive types.
pub mod types;
