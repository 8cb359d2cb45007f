//! Job lifecycle engine and actor runtime for the job queue.
//!
//! This crate wires a [`JobStore`](queue_db::JobStore) and a [`Transport`]
//! together into a durable, at-least-once job queue.
//!
//! # Architecture
//!
//! - `Enqueuer` - Persists a pending job, then publishes its envelope
//! - `Consumer` - Claims, runs and records jobs, one delivery at a time
//! - `JobAdmin` - Manual retry, cancellation and republishing
//! - `ConsumerSupervisor` - Ractor actor running a pool of `ConsumerActor`s
//!
//! # Usage
//!
//! ```ignore
//! use queue_actors::{HandlerRegistry, JobQueue, MemoryTransport, start_consumers};
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_fn("echo", |payload| async move { Ok(payload) });
//!
//! let queue = JobQueue::new(store, transport, handlers);
//! let id = queue.enqueue("echo", json!({"message": "hi"}), Default::default()).await?;
//!
//! let (supervisor, handle) = start_consumers(Arc::new(queue.consumer()), queue.config()).await?;
//! ```

mod admin;
mod consumer;
mod consumer_actor;
mod enqueuer;
mod error;
mod events;
mod handler;
mod memory_transport;
mod messages;
mod queue;
mod stats;
mod supervisor;
mod transport;

pub use admin::{CANCELLED, JobAdmin};
pub use consumer::{BatchReport, Consumer, Outcome};
pub use consumer_actor::{ConsumerActor, ConsumerArgs};
pub use enqueuer::Enqueuer;
pub use error::{ConsumerError, EnqueueError, QueueError};
pub use events::EventSink;
pub use handler::{FnHandler, HandlerFuture, HandlerRegistry, HandlerResult, JobHandler};
pub use memory_transport::MemoryTransport;
pub use messages::{ConsumerMessage, ConsumerStatus, SupervisorMessage};
pub use queue::JobQueue;
pub use stats::StatsAggregator;
pub use supervisor::{ConsumerSupervisor, SupervisorArgs, start_consumers};
pub use transport::{Delivery, Transport, TransportError};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
