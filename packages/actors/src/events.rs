//! Broadcast of lifecycle events.

use queue_core::JobEvent;
use tokio::sync::broadcast;

/// Optional fan-out of [`JobEvent`]s. Sending never blocks and never fails.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<broadcast::Sender<JobEvent>>,
}

impl EventSink {
    /// A sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Broadcast an event.
    pub fn emit(&self, event: JobEvent) {
        if let Some(ref tx) = self.tx {
            tracing::trace!(job_id = %event.job_id(), "{}", event.description());
            let _ = tx.send(event);
        }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<JobEvent>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }
}
