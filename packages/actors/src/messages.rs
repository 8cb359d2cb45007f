//! Message types for actor communication.

use ractor::RpcReplyPort;
use serde::Serialize;

use crate::consumer::BatchReport;

/// Messages for the ConsumerActor.
#[derive(Debug)]
pub enum ConsumerMessage {
    /// Receive and process one batch.
    Poll,

    /// Report counters processed so far.
    Status { reply: RpcReplyPort<ConsumerStatus> },

    /// Stop after the current batch.
    Shutdown,
}

/// Messages for the ConsumerSupervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Number of live consumers.
    ConsumerCount { reply: RpcReplyPort<usize> },

    /// Status of every live consumer.
    Statuses {
        reply: RpcReplyPort<Vec<ConsumerStatus>>,
    },

    /// Stop all consumers, then the supervisor.
    Shutdown,
}

/// Snapshot of one consumer's work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatus {
    pub consumer_id: usize,
    /// Non-empty batches processed.
    pub batches: u64,
    pub totals: BatchReport,
}
