//! Authoritative world state and per-tick advance

use std::time::Duration;

use tracing::debug;

use super::input::InputAggregator;
use super::physics::{EntityState, MovementPolicy, PhysicsSystem};
use super::WorldConfig;

/// Tuning that shapes movement speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementTuning {
    /// Grid move duration at multiplier 1.0
    pub base_tile_duration_ms: f64,
    /// Upper bound on one continuous-policy step
    pub max_delta_ms: f64,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            base_tile_duration_ms: 250.0,
            max_delta_ms: 100.0,
        }
    }
}

/// Owns the entity and advances it; nothing else mutates it
#[derive(Debug)]
pub struct Simulation {
    policy: MovementPolicy,
    world: WorldConfig,
    tuning: MovementTuning,
    entity: EntityState,
    /// Accumulated grid progress not yet spent on a move
    progress_ms: f64,
}

impl Simulation {
    pub fn new(policy: MovementPolicy, world: WorldConfig, tuning: MovementTuning) -> Self {
        let entity = EntityState::initial(policy, &world);
        Self {
            policy,
            world,
            tuning,
            entity,
            progress_ms: 0.0,
        }
    }

    pub fn policy(&self) -> MovementPolicy {
        self.policy
    }

    pub fn world(&self) -> &WorldConfig {
        &self.world
    }

    pub fn entity(&self) -> &EntityState {
        &self.entity
    }

    pub fn progress_ms(&self) -> f64 {
        self.progress_ms
    }

    /// Restore the initial entity and a clean timing baseline
    pub fn reset(&mut self) {
        self.entity = EntityState::initial(self.policy, &self.world);
        self.progress_ms = 0.0;
    }

    /// Milliseconds the client should take to show one update
    pub fn effective_move_duration_ms(&self, speed_multiplier: f64) -> f64 {
        match self.policy {
            MovementPolicy::Grid => self.tuning.base_tile_duration_ms / speed_multiplier,
            MovementPolicy::Continuous => self.world.tick_interval_ms(),
        }
    }

    /// Advance the world by `delta`, steering with `controller`'s input
    pub fn advance(&mut self, delta: Duration, inputs: &InputAggregator, controller: &str) {
        let delta_ms = delta.as_secs_f64() * 1000.0;

        match self.policy {
            MovementPolicy::Continuous => {
                let dt = delta_ms.min(self.tuning.max_delta_ms) / 1000.0;
                PhysicsSystem::bounce(&mut self.entity, &self.world, dt);
            }
            MovementPolicy::Grid => {
                let effective = self.effective_move_duration_ms(inputs.speed_multiplier(controller));
                let moves = PhysicsSystem::advance_grid(
                    &mut self.entity,
                    &self.world,
                    &mut self.progress_ms,
                    delta_ms,
                    effective,
                    || inputs.resolve_effective_direction(controller),
                );
                if moves > 1 {
                    debug!(moves, delta_ms, "Applied several grid moves in one tick");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::Bounds;
    use crate::ws::protocol::Direction;

    fn grid_sim() -> Simulation {
        Simulation::new(
            MovementPolicy::Grid,
            WorldConfig::defaults_for(MovementPolicy::Grid),
            MovementTuning::default(),
        )
    }

    #[test]
    fn continuous_delta_is_clamped() {
        let mut sim = Simulation::new(
            MovementPolicy::Continuous,
            WorldConfig::defaults_for(MovementPolicy::Continuous),
            MovementTuning::default(),
        );
        let inputs = InputAggregator::new(0.1, 5.0);

        sim.advance(Duration::from_secs(10), &inputs, "player1");
        // 100ms at (50, 70) units per second
        assert!((sim.entity().x - 105.0).abs() < 1e-9);
        assert!((sim.entity().y - 107.0).abs() < 1e-9);
    }

    #[test]
    fn continuous_stays_in_bounds_for_any_small_delta() {
        let world = WorldConfig::defaults_for(MovementPolicy::Continuous);
        let mut sim = Simulation::new(MovementPolicy::Continuous, world.clone(), MovementTuning::default());
        let inputs = InputAggregator::new(0.1, 5.0);
        let bounds = Bounds::continuous(&world, sim.entity().size);

        for i in 1..=3000u64 {
            sim.advance(Duration::from_micros(i * 7919 % 100_000 + 1), &inputs, "player1");
            assert!(bounds.contains(sim.entity().x, sim.entity().y));
        }
    }

    #[test]
    fn speed_multiplier_shortens_grid_moves() {
        let mut sim = grid_sim();
        let mut inputs = InputAggregator::new(0.1, 5.0);
        inputs.set_input("player1", None, Direction::Left, true, Some(1));
        inputs.set_speed_multiplier("player1", None, 2.0);
        assert_eq!(sim.effective_move_duration_ms(2.0), 125.0);

        sim.advance(Duration::from_millis(250), &inputs, "player1");
        assert_eq!(sim.entity().x, 1025.0 - 100.0);
        assert_eq!(sim.progress_ms(), 0.0);
    }

    #[test]
    fn only_the_controller_steers() {
        let mut sim = grid_sim();
        let mut inputs = InputAggregator::new(0.1, 5.0);
        inputs.set_input("player2", None, Direction::Down, true, Some(1));

        sim.advance(Duration::from_millis(250), &inputs, "player1");
        assert_eq!((sim.entity().x, sim.entity().y), (1025.0, 775.0));
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut sim = grid_sim();
        let mut inputs = InputAggregator::new(0.1, 5.0);
        inputs.toggle_auto_move("player1", None, Some(Direction::Up));
        sim.advance(Duration::from_millis(900), &inputs, "player1");
        assert_ne!(sim.entity().y, 775.0);

        sim.reset();
        assert_eq!((sim.entity().x, sim.entity().y), (1025.0, 775.0));
        assert_eq!(sim.progress_ms(), 0.0);
    }
}
