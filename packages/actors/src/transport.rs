//! Delivery transport contract.

use std::future::Future;
use std::time::Duration;

use queue_core::Envelope;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,
    #[error("Unknown delivery receipt: {0}")]
    UnknownReceipt(u64),
}

/// One leased delivery of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Lease handle used to ack or retry this delivery.
    pub receipt: u64,
    pub envelope: Envelope,
    /// How many times this envelope has been handed out, this one included.
    pub delivery_count: u32,
}

/// At-least-once, batch-oriented envelope transport.
///
/// A received delivery must be either acked (dropped for good) or retried
/// (redelivered after a delay). A delivery that is neither is redelivered
/// by the transport on its own schedule.
pub trait Transport: Send + Sync + 'static {
    /// Publish an envelope for delivery.
    fn publish(&self, envelope: Envelope)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Lease up to `max` visible envelopes.
    fn receive(
        &self,
        max: usize,
    ) -> impl Future<Output = Result<Vec<Delivery>, TransportError>> + Send;

    /// Acknowledge a delivery; it will not be delivered again.
    fn ack(&self, delivery: &Delivery) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Release a delivery for redelivery after `delay`, or the transport's
    /// default delay when `None`.
    fn retry(
        &self,
        delivery: &Delivery,
        delay: Option<Duration>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
