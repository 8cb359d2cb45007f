//! Supervisor actor owning the consumer pool.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use queue_core::QueueConfig;
use queue_db::JobStore;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};

use crate::consumer::Consumer;
use crate::consumer_actor::{ConsumerActor, ConsumerArgs};
use crate::messages::{ConsumerMessage, SupervisorMessage};
use crate::transport::Transport;

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the supervisor actor.
pub struct SupervisorState<S, T> {
    /// Live consumers by actor id.
    consumers: HashMap<ActorId, (ConsumerArgs<S, T>, ActorRef<ConsumerMessage>)>,
    consumer: Arc<Consumer<S, T>>,
    poll_interval: Duration,
    shutting_down: bool,
    /// Consumer counter for unique IDs.
    consumer_counter: usize,
}

impl<S, T> SupervisorState<S, T> {
    fn next_args(&mut self) -> ConsumerArgs<S, T> {
        self.consumer_counter += 1;
        ConsumerArgs {
            consumer_id: self.consumer_counter,
            consumer: self.consumer.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

/// Supervisor arguments.
pub struct SupervisorArgs<S, T> {
    pub consumer: Arc<Consumer<S, T>>,
    pub concurrency: usize,
    pub poll_interval: Duration,
}

async fn spawn_consumer<S: JobStore, T: Transport>(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState<S, T>,
    args: ConsumerArgs<S, T>,
) -> Result<(), ActorProcessingErr> {
    let (actor, _handle) =
        Actor::spawn_linked(None, ConsumerActor::new(), args.clone(), myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn consumer: {}", e)))?;

    state.consumers.insert(actor.get_id(), (args, actor));
    Ok(())
}

/// Supervisor that runs `concurrency` consumers and replaces any that fail.
pub struct ConsumerSupervisor<S, T> {
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> ConsumerSupervisor<S, T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S, T> Default for ConsumerSupervisor<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore, T: Transport> Actor for ConsumerSupervisor<S, T> {
    type Msg = SupervisorMessage;
    type State = SupervisorState<S, T>;
    type Arguments = SupervisorArgs<S, T>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting consumer supervisor with {} consumers", args.concurrency);

        let mut state = SupervisorState {
            consumers: HashMap::new(),
            consumer: args.consumer,
            poll_interval: args.poll_interval,
            shutting_down: false,
            consumer_counter: 0,
        };

        for _ in 0..args.concurrency.max(1) {
            let consumer_args = state.next_args();
            spawn_consumer(&myself, &mut state, consumer_args).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::ConsumerCount { reply } => {
                let _ = reply.send(state.consumers.len());
            }

            SupervisorMessage::Statuses { reply } => {
                let mut statuses = Vec::with_capacity(state.consumers.len());
                for (_, actor) in state.consumers.values() {
                    let result = ractor::rpc::call(
                        actor,
                        |reply| ConsumerMessage::Status { reply },
                        Some(STATUS_TIMEOUT),
                    )
                    .await;
                    if let Ok(ractor::rpc::CallResult::Success(status)) = result {
                        statuses.push(status);
                    }
                }
                statuses.sort_by_key(|s| s.consumer_id);
                let _ = reply.send(statuses);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down consumer supervisor");
                state.shutting_down = true;
                for (_, actor) in state.consumers.values() {
                    let _ = actor.send_message(ConsumerMessage::Shutdown);
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                let Some((args, _)) = state.consumers.remove(&cell.get_id()) else {
                    return Ok(());
                };
                tracing::warn!("Consumer {} failed: {}", args.consumer_id, err);
                if !state.shutting_down {
                    tracing::info!("Restarting consumer {}", args.consumer_id);
                    spawn_consumer(&myself, state, args).await?;
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some((args, _)) = state.consumers.remove(&cell.get_id()) {
                    tracing::info!(
                        "Consumer {} terminated: {:?}",
                        args.consumer_id,
                        reason
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the consumer pool described by `config`.
pub async fn start_consumers<S: JobStore, T: Transport>(
    consumer: Arc<Consumer<S, T>>,
    config: &QueueConfig,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let args = SupervisorArgs {
        consumer,
        concurrency: config.concurrency as usize,
        poll_interval: config.poll_interval(),
    };

    let (actor, handle) = Actor::spawn(None, ConsumerSupervisor::new(), args).await?;

    Ok((actor, handle))
}
