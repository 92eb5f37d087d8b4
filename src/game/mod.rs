//! Game simulation modules

pub mod engine;
pub mod input;
pub mod physics;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;

pub use engine::{Engine, EngineCommand, EngineError, EngineHandle, LifecycleRequest};
pub use input::{InputAggregator, InputRecord};
pub use physics::{EntityState, MovementPolicy};
pub use scheduler::{Lifecycle, TickScheduler, Transition};
pub use simulation::Simulation;
pub use snapshot::Snapshot;

/// World geometry and tick rate, fixed for the life of the process
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub grid_size: f64,
    /// Viewport size advertised to clients
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Ticks per second
    pub tick_rate: f64,
}

impl WorldConfig {
    pub fn defaults_for(policy: MovementPolicy) -> Self {
        match policy {
            MovementPolicy::Continuous => Self {
                width: 600.0,
                height: 400.0,
                grid_size: 50.0,
                canvas_width: 600.0,
                canvas_height: 400.0,
                tick_rate: 1.5,
            },
            MovementPolicy::Grid => Self {
                width: 2000.0,
                height: 1500.0,
                grid_size: 50.0,
                canvas_width: 800.0,
                canvas_height: 600.0,
                tick_rate: 10.0,
            },
        }
    }

    /// Milliseconds between ticks
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.tick_rate
    }
}
