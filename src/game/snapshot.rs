//! Immutable world snapshots and their wire encoding

use crate::ws::protocol::{AutoMoveState, EntityView, ServerMsg, WorldView};

use super::input::InputAggregator;
use super::physics::{round2, EntityState};
use super::scheduler::TickScheduler;
use super::simulation::Simulation;
use super::WorldConfig;

/// Point-in-time copy of everything a client needs to render
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub entity: EntityState,
    pub world: WorldConfig,
    pub effective_move_duration_ms: f64,
    pub auto_move: AutoMoveState,
    pub last_processed_sequence: u64,
    pub running: bool,
    pub paused: bool,
}

impl Snapshot {
    /// Copy the current state; callers only capture between whole updates
    pub fn capture(
        sim: &Simulation,
        inputs: &InputAggregator,
        scheduler: &TickScheduler,
        controller: &str,
    ) -> Self {
        Self {
            entity: sim.entity().clone(),
            world: sim.world().clone(),
            effective_move_duration_ms: sim
                .effective_move_duration_ms(inputs.speed_multiplier(controller)),
            auto_move: inputs.auto_move(controller),
            last_processed_sequence: inputs.last_sequence(controller),
            running: scheduler.is_running(),
            paused: scheduler.is_paused(),
        }
    }

    /// Build the `game_state_update` message
    pub fn to_message(&self) -> ServerMsg {
        ServerMsg::GameStateUpdate {
            entity: EntityView {
                x: round2(self.entity.x),
                y: round2(self.entity.y),
                size: self.entity.size,
                color: self.entity.color.to_string(),
            },
            world: WorldView {
                width: self.world.width,
                height: self.world.height,
                grid_size: self.world.grid_size,
                canvas_width: self.world.canvas_width,
                canvas_height: self.world.canvas_height,
            },
            server_rate: self.world.tick_rate,
            effective_move_duration_ms: round2(self.effective_move_duration_ms),
            auto_move: self.auto_move,
            last_processed_sequence: self.last_processed_sequence,
            running: self.running,
            paused: self.paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::MovementPolicy;
    use crate::game::simulation::MovementTuning;
    use crate::ws::protocol::Direction;

    #[tokio::test]
    async fn message_rounds_coordinates_and_reports_controller() {
        let world = WorldConfig::defaults_for(MovementPolicy::Continuous);
        let mut sim = Simulation::new(MovementPolicy::Continuous, world, MovementTuning::default());
        let mut inputs = InputAggregator::new(0.1, 5.0);
        inputs.set_input("player1", None, Direction::Up, true, Some(42));
        inputs.toggle_auto_move("player1", None, Some(Direction::Left));
        let scheduler = TickScheduler::new(1.5);

        sim.advance(std::time::Duration::from_millis(33), &inputs, "player1");
        let snapshot = Snapshot::capture(&sim, &inputs, &scheduler, "player1");

        match snapshot.to_message() {
            ServerMsg::GameStateUpdate {
                entity,
                last_processed_sequence,
                auto_move,
                effective_move_duration_ms,
                running,
                ..
            } => {
                assert_eq!(entity.x, 101.65);
                assert_eq!(entity.y, 102.31);
                assert_eq!(entity.size, 80.0);
                assert_eq!(last_processed_sequence, 42);
                assert_eq!(auto_move.direction, Direction::Left);
                assert_eq!(effective_move_duration_ms, 666.67);
                assert!(!running);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
