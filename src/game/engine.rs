//! Simulation owner and authoritative tick loop

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ws::protocol::{Direction, InputState, ServerMsg};
use crate::ws::registry::{ConnectionId, ConnectionRegistry};

use super::input::InputAggregator;
use super::scheduler::TickScheduler;
use super::simulation::{MovementTuning, Simulation};
use super::snapshot::Snapshot;

/// Lifecycle requests clients may send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Stop,
    Pause,
    Resume,
}

impl LifecycleRequest {
    fn status_message(self) -> &'static str {
        match self {
            LifecycleRequest::Start => "Game started!",
            LifecycleRequest::Stop => "Game stopped.",
            LifecycleRequest::Pause => "Game paused.",
            LifecycleRequest::Resume => "Game resumed.",
        }
    }
}

/// Everything that may change simulation state, delivered to the engine task
#[derive(Debug)]
pub enum EngineCommand {
    Lifecycle(LifecycleRequest),
    SetInput {
        conn: ConnectionId,
        player: String,
        input_state: InputState,
        sequence: u64,
    },
    ToggleAutoMove {
        conn: ConnectionId,
        player: String,
        direction: Option<Direction>,
    },
    SetSpeed {
        conn: ConnectionId,
        player: String,
        multiplier: f64,
    },
    /// Send the current snapshot to one connection
    Sync { conn: ConnectionId },
    /// A connection closed; drop the input it owned
    Disconnected { conn: ConnectionId },
    /// Reply with the current snapshot
    Inspect { reply: oneshot::Sender<Snapshot> },
    /// Close all connections and exit; no tick runs afterwards
    Shutdown { ack: oneshot::Sender<()> },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine is not running")]
    Closed,
}

/// Cloneable handle used by connection tasks to reach the engine
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.tx.send(cmd).await.map_err(|_| EngineError::Closed)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Inspect { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (ack, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown { ack }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }
}

enum Event {
    Command(Option<EngineCommand>),
    Tick,
}

/// The authoritative engine. Owns the simulation, the input records and
/// the scheduler; runs as a single task so updates never interleave.
pub struct Engine {
    sim: Simulation,
    inputs: InputAggregator,
    scheduler: TickScheduler,
    controller: String,
    registry: Arc<ConnectionRegistry>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(config: &Config, registry: Arc<ConnectionRegistry>) -> (Self, EngineHandle) {
        let (tx, cmd_rx) = mpsc::channel(256);
        let tuning = MovementTuning {
            base_tile_duration_ms: config.base_tile_duration_ms,
            max_delta_ms: config.max_delta_ms,
        };

        let engine = Self {
            sim: Simulation::new(config.policy, config.world.clone(), tuning),
            inputs: InputAggregator::new(config.speed_min, config.speed_max),
            scheduler: TickScheduler::new(config.world.tick_rate),
            controller: config.controller().to_string(),
            registry,
            cmd_rx,
        };

        (engine, EngineHandle { tx })
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(
            policy = ?self.sim.policy(),
            tick_rate = self.sim.world().tick_rate,
            controller = %self.controller,
            "Engine running"
        );

        loop {
            let event = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => Event::Command(cmd),
                _ = self.scheduler.next_tick() => Event::Tick,
            };

            match event {
                Event::Command(Some(EngineCommand::Shutdown { ack })) => {
                    self.shutdown();
                    let _ = ack.send(());
                    break;
                }
                Event::Command(Some(cmd)) => self.handle_command(cmd),
                Event::Command(None) => {
                    self.shutdown();
                    break;
                }
                Event::Tick => self.tick(),
            }
        }

        info!("Engine stopped");
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Lifecycle(request) => self.handle_lifecycle(request),
            EngineCommand::SetInput {
                conn,
                player,
                input_state,
                sequence,
            } => {
                self.inputs
                    .apply_input_state(&player, Some(conn), input_state, sequence);
            }
            EngineCommand::ToggleAutoMove {
                conn,
                player,
                direction,
            } => {
                let state = self.inputs.toggle_auto_move(&player, Some(conn), direction);
                info!(player = %player, active = state.active, direction = %state.direction, "Auto-move toggled");
            }
            EngineCommand::SetSpeed {
                conn,
                player,
                multiplier,
            } => {
                let applied = self.inputs.set_speed_multiplier(&player, Some(conn), multiplier);
                info!(player = %player, requested = multiplier, applied, "Speed multiplier set");
            }
            EngineCommand::Sync { conn } => {
                let msg = self.snapshot().to_message();
                if !self.registry.send_to(conn, &msg) {
                    debug!(conn_id = %conn, "Sync target no longer registered");
                }
            }
            EngineCommand::Disconnected { conn } => {
                let released = self.inputs.remove_connection(conn);
                if !released.is_empty() {
                    debug!(conn_id = %conn, players = ?released, "Released input records");
                }
            }
            EngineCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::Shutdown { ack } => {
                // Handled by the run loop; reaching here means a nested call
                self.shutdown();
                let _ = ack.send(());
            }
        }
    }

    fn handle_lifecycle(&mut self, request: LifecycleRequest) {
        let transition = match request {
            LifecycleRequest::Start => {
                let transition = self.scheduler.start();
                if transition.applied() {
                    self.sim.reset();
                }
                transition
            }
            LifecycleRequest::Stop => {
                let transition = self.scheduler.stop();
                self.sim.reset();
                if transition.applied() {
                    self.inputs.reset();
                }
                transition
            }
            LifecycleRequest::Pause => self.scheduler.pause(),
            LifecycleRequest::Resume => self.scheduler.resume(),
        };

        if !transition.applied() {
            return;
        }

        self.broadcast_snapshot();
        self.registry.broadcast(&ServerMsg::GameStatus {
            message: request.status_message().to_string(),
        });
    }

    fn tick(&mut self) {
        let delta = self.scheduler.measure_delta();
        self.sim.advance(delta, &self.inputs, &self.controller);
        self.broadcast_snapshot();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.sim, &self.inputs, &self.scheduler, &self.controller)
    }

    fn broadcast_snapshot(&self) {
        self.registry.broadcast(&self.snapshot().to_message());
    }

    fn shutdown(&mut self) {
        let closed = self.registry.close_all();
        self.scheduler.stop();
        if closed > 0 {
            warn!(connections = closed, "Closed connections for shutdown");
        }
    }
}
