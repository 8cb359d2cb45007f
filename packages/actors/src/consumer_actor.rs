//! Consumer actor: a polling loop around [`Consumer`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use queue_db::JobStore;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::consumer::{BatchReport, Consumer};
use crate::error::ConsumerError;
use crate::messages::{ConsumerMessage, ConsumerStatus};
use crate::transport::{Transport, TransportError};

/// State for the consumer actor.
pub struct ConsumerActorState<S, T> {
    pub consumer_id: usize,
    consumer: Arc<Consumer<S, T>>,
    poll_interval: Duration,
    batches: u64,
    totals: BatchReport,
}

impl<S, T> ConsumerActorState<S, T> {
    fn status(&self) -> ConsumerStatus {
        ConsumerStatus {
            consumer_id: self.consumer_id,
            batches: self.batches,
            totals: self.totals,
        }
    }
}

/// Consumer actor arguments.
pub struct ConsumerArgs<S, T> {
    pub consumer_id: usize,
    pub consumer: Arc<Consumer<S, T>>,
    pub poll_interval: Duration,
}

impl<S, T> Clone for ConsumerArgs<S, T> {
    fn clone(&self) -> Self {
        Self {
            consumer_id: self.consumer_id,
            consumer: self.consumer.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

/// Actor that polls the transport and processes batches.
///
/// After a non-empty batch it polls again straight away; after an empty
/// batch or a transport error it waits one poll interval.
pub struct ConsumerActor<S, T> {
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> ConsumerActor<S, T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S, T> Default for ConsumerActor<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore, T: Transport> Actor for ConsumerActor<S, T> {
    type Msg = ConsumerMessage;
    type State = ConsumerActorState<S, T>;
    type Arguments = ConsumerArgs<S, T>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting consumer: {}", args.consumer_id);

        myself.send_message(ConsumerMessage::Poll)?;

        Ok(ConsumerActorState {
            consumer_id: args.consumer_id,
            consumer: args.consumer,
            poll_interval: args.poll_interval,
            batches: 0,
            totals: BatchReport::default(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConsumerMessage::Poll => match state.consumer.poll_once().await {
                Ok(report) if report.received > 0 => {
                    state.batches += 1;
                    state.totals.merge(&report);
                    tracing::debug!(
                        consumer = state.consumer_id,
                        received = report.received,
                        completed = report.completed,
                        retried = report.retried,
                        errors = report.errors,
                        "Batch processed"
                    );
                    myself.send_message(ConsumerMessage::Poll)?;
                }
                Ok(_) => {
                    myself.send_after(state.poll_interval, || ConsumerMessage::Poll);
                }
                Err(ConsumerError::Transport(TransportError::Closed)) => {
                    tracing::info!("Transport closed, stopping consumer: {}", state.consumer_id);
                    myself.stop(Some("transport closed".into()));
                }
                Err(e) => {
                    tracing::warn!("Consumer {} poll failed: {}", state.consumer_id, e);
                    myself.send_after(state.poll_interval, || ConsumerMessage::Poll);
                }
            },

            ConsumerMessage::Status { reply } => {
                let _ = reply.send(state.status());
            }

            ConsumerMessage::Shutdown => {
                tracing::info!("Shutting down consumer: {}", state.consumer_id);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
