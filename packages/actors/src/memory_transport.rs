//! In-process transport with visibility-timeout leases.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use queue_core::{Clock, Envelope, later};
use tokio::sync::Mutex;

use crate::transport::{Delivery, Transport, TransportError};

/// Envelope waiting to become visible.
#[derive(Debug, Clone)]
struct Queued {
    seq: u64,
    envelope: Envelope,
    visible_at: DateTime<Utc>,
    delivery_count: u32,
}

/// Delivery order among visible envelopes: higher priority first, then older first.
fn delivery_order(a: &Queued, b: &Queued) -> Ordering {
    match b.envelope.priority.cmp(&a.envelope.priority) {
        Ordering::Equal => a
            .visible_at
            .cmp(&b.visible_at)
            .then_with(|| a.seq.cmp(&b.seq)),
        other => other,
    }
}

#[derive(Debug)]
struct Leased {
    queued: Queued,
    lease_until: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TransportState {
    next_seq: u64,
    next_receipt: u64,
    ready: Vec<Queued>,
    in_flight: HashMap<u64, Leased>,
    closed: bool,
}

impl TransportState {
    /// Return expired leases to the ready set.
    fn reclaim_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, leased)| leased.lease_until <= now)
            .map(|(receipt, _)| *receipt)
            .collect();

        for receipt in expired {
            if let Some(mut leased) = self.in_flight.remove(&receipt) {
                tracing::debug!(
                    job_id = %leased.queued.envelope.job_id,
                    "Lease expired, redelivering"
                );
                leased.queued.visible_at = now;
                self.ready.push(leased.queued);
            }
        }
    }
}

/// At-least-once transport living in process memory.
///
/// Un-acked deliveries reappear once their visibility timeout passes.
/// Time is read from the injected clock, so tests can drive delays.
pub struct MemoryTransport {
    state: Mutex<TransportState>,
    clock: Arc<dyn Clock>,
    visibility_timeout: Duration,
    default_retry_delay: Duration,
}

impl MemoryTransport {
    pub fn new(clock: Arc<dyn Clock>, visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(TransportState::default()),
            clock,
            visibility_timeout,
            default_retry_delay: Duration::ZERO,
        }
    }

    /// Delay used by `retry(_, None)`.
    pub fn with_default_retry_delay(mut self, delay: Duration) -> Self {
        self.default_retry_delay = delay;
        self
    }

    /// Refuse all further publishes and receives.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Accept traffic again after [`close`](Self::close).
    pub async fn reopen(&self) {
        self.state.lock().await.closed = false;
    }

    /// Leased, not yet acked deliveries.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Queued plus in flight.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The earliest instant at which something will be deliverable.
    pub async fn next_visible_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        let ready = state.ready.iter().map(|q| q.visible_at);
        let leases = state.in_flight.values().map(|l| l.lease_until);
        ready.chain(leases).min()
    }

}

impl Transport for MemoryTransport {
    async fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(TransportError::Closed);
        }

        let visible_at = envelope.scheduled_for.map_or(now, |at| at.max(now));
        let seq = state.next_seq;
        state.next_seq += 1;
        state.ready.push(Queued {
            seq,
            envelope,
            visible_at,
            delivery_count: 0,
        });
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, TransportError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(TransportError::Closed);
        }

        state.reclaim_expired(now);

        let (mut visible, waiting): (Vec<Queued>, Vec<Queued>) = std::mem::take(&mut state.ready)
            .into_iter()
            .partition(|q| q.visible_at <= now);
        visible.sort_by(delivery_order);
        let rest = visible.split_off(visible.len().min(max));
        state.ready = waiting;
        state.ready.extend(rest);

        let lease_until = later(now, self.visibility_timeout);
        let mut deliveries = Vec::with_capacity(visible.len());
        for mut queued in visible {
            queued.delivery_count += 1;
            let receipt = state.next_receipt;
            state.next_receipt += 1;
            deliveries.push(Delivery {
                receipt,
                envelope: queued.envelope.clone(),
                delivery_count: queued.delivery_count,
            });
            state.in_flight.insert(
                receipt,
                Leased {
                    queued,
                    lease_until,
                },
            );
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&delivery.receipt)
            .map(|_| ())
            .ok_or(TransportError::UnknownReceipt(delivery.receipt))
    }

    async fn retry(&self, delivery: &Delivery, delay: Option<Duration>) -> Result<(), TransportError> {
        let now = self.clock.now();
        let visible_at = later(now, delay.unwrap_or(self.default_retry_delay));
        let mut state = self.state.lock().await;
        let mut leased = state
            .in_flight
            .remove(&delivery.receipt)
            .ok_or(TransportError::UnknownReceipt(delivery.receipt))?;

        leased.queued.visible_at = visible_at;
        leased.queued.envelope.retry_attempt += 1;
        state.ready.push(leased.queued);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{Job, JobOptions, ManualClock};
    use serde_json::json;

    fn envelope(priority: i32) -> Envelope {
        let options = JobOptions::default().with_priority(priority);
        Envelope::for_job(&Job::new("echo", json!({}), &options, 3, Utc::now()))
    }

    fn transport(clock: &Arc<ManualClock>) -> MemoryTransport {
        MemoryTransport::new(clock.clone(), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn delivers_higher_priority_first_then_fifo() {
        let clock = Arc::new(ManualClock::default());
        let transport = transport(&clock);
        let low = envelope(0);
        let high = envelope(5);
        let low_later = envelope(0);
        for e in [&low, &high, &low_later] {
            transport.publish(e.clone()).await.unwrap();
        }

        let batch = transport.receive(2).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|d| d.envelope.job_id).collect();
        assert_eq!(ids, vec![high.job_id, low.job_id]);

        let rest = transport.receive(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].envelope.job_id, low_later.job_id);
    }

    #[tokio::test]
    async fn unacked_delivery_reappears_after_lease() {
        let clock = Arc::new(ManualClock::default());
        let transport = transport(&clock);
        transport.publish(envelope(0)).await.unwrap();

        let first = transport.receive(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(transport.receive(10).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(31));
        let again = transport.receive(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].delivery_count, 2);

        // The first lease is gone.
        assert_eq!(
            transport.ack(&first[0]).await,
            Err(TransportError::UnknownReceipt(first[0].receipt))
        );
        transport.ack(&again[0]).await.unwrap();
        assert!(transport.is_empty().await);
    }

    #[tokio::test]
    async fn retry_delays_redelivery() {
        let clock = Arc::new(ManualClock::default());
        let transport = transport(&clock);
        transport.publish(envelope(0)).await.unwrap();

        let delivery = transport.receive(1).await.unwrap().remove(0);
        transport
            .retry(&delivery, Some(Duration::from_secs(120)))
            .await
            .unwrap();
        assert_eq!(
            transport.next_visible_at().await,
            Some(clock.now() + chrono::Duration::seconds(120))
        );

        clock.advance(Duration::from_secs(119));
        assert!(transport.receive(1).await.unwrap().is_empty());
        clock.advance(Duration::from_secs(1));
        let redelivered = transport.receive(1).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].envelope.retry_attempt, 1);
    }

    #[tokio::test]
    async fn scheduled_envelope_stays_hidden() {
        let clock = Arc::new(ManualClock::default());
        let transport = transport(&clock);
        let mut scheduled = envelope(0);
        scheduled.scheduled_for = Some(clock.now() + chrono::Duration::minutes(10));
        transport.publish(scheduled).await.unwrap();

        assert!(transport.receive(1).await.unwrap().is_empty());
        clock.advance(Duration::from_secs(600));
        assert_eq!(transport.receive(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_transport_rejects_publish() {
        let clock = Arc::new(ManualClock::default());
        let transport = transport(&clock);
        transport.close().await;
        assert_eq!(
            transport.publish(envelope(0)).await,
            Err(TransportError::Closed)
        );
        transport.reopen().await;
        assert!(transport.publish(envelope(0)).await.is_ok());
    }
}
