//! Entity movement rules: elastic bounce and grid stepping

use std::str::FromStr;

use crate::ws::protocol::Direction;

use super::WorldConfig;

/// How the entity moves, selected per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementPolicy {
    /// Velocity integration with wall bounce
    Continuous,
    /// One grid cell per effective move duration
    Grid,
}

impl FromStr for MovementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "grid" => Ok(Self::Grid),
            other => Err(format!("unknown movement policy: {other}")),
        }
    }
}

/// Authoritative entity state
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub x: f64,
    pub y: f64,
    /// Radius for the continuous policy, cell side for the grid policy
    pub size: f64,
    pub color: &'static str,
    /// Velocity in world units per second (continuous policy)
    pub vel_x: f64,
    pub vel_y: f64,
    /// Last direction moved (grid policy)
    pub facing: Option<Direction>,
}

impl EntityState {
    /// Starting state for a policy, already clamped to the world
    pub fn initial(policy: MovementPolicy, world: &WorldConfig) -> Self {
        let mut entity = match policy {
            MovementPolicy::Continuous => Self {
                x: 100.0,
                y: 100.0,
                size: 80.0,
                color: "#3498db",
                vel_x: 50.0,
                vel_y: 70.0,
                facing: None,
            },
            MovementPolicy::Grid => {
                let bounds = Bounds::grid(world);
                Self {
                    x: bounds.center_x(world),
                    y: bounds.center_y(world),
                    size: world.grid_size,
                    color: "#e74c3c",
                    vel_x: 0.0,
                    vel_y: 0.0,
                    facing: None,
                }
            }
        };

        let bounds = Bounds::for_policy(policy, world, entity.size);
        entity.x = entity.x.clamp(bounds.min_x, bounds.max_x);
        entity.y = entity.y.clamp(bounds.min_y, bounds.max_y);
        entity
    }
}

/// Inclusive range of legal entity centers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn for_policy(policy: MovementPolicy, world: &WorldConfig, size: f64) -> Self {
        match policy {
            MovementPolicy::Continuous => Self::continuous(world, size),
            MovementPolicy::Grid => Self::grid(world),
        }
    }

    /// Centers keeping a body of radius `half_extent` inside the world
    pub fn continuous(world: &WorldConfig, half_extent: f64) -> Self {
        Self {
            min_x: half_extent,
            max_x: (world.width - half_extent).max(half_extent),
            min_y: half_extent,
            max_y: (world.height - half_extent).max(half_extent),
        }
    }

    /// Centers of the first and last whole grid cells on each axis
    pub fn grid(world: &WorldConfig) -> Self {
        let half = world.grid_size / 2.0;
        let cols = (world.width / world.grid_size).floor().max(1.0);
        let rows = (world.height / world.grid_size).floor().max(1.0);
        Self {
            min_x: half,
            max_x: (cols - 1.0) * world.grid_size + half,
            min_y: half,
            max_y: (rows - 1.0) * world.grid_size + half,
        }
    }

    fn center_x(&self, world: &WorldConfig) -> f64 {
        let cols = ((self.max_x - self.min_x) / world.grid_size).round() + 1.0;
        (cols / 2.0).floor() * world.grid_size + world.grid_size / 2.0
    }

    fn center_y(&self, world: &WorldConfig) -> f64 {
        let rows = ((self.max_y - self.min_y) / world.grid_size).round() + 1.0;
        (rows / 2.0).floor() * world.grid_size + world.grid_size / 2.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

/// Movement system for both policies
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Integrate velocity over `dt` seconds, bouncing off the walls
    pub fn bounce(entity: &mut EntityState, world: &WorldConfig, dt: f64) {
        entity.x += entity.vel_x * dt;
        entity.y += entity.vel_y * dt;

        let bounds = Bounds::continuous(world, entity.size);

        if entity.x > bounds.max_x {
            entity.x = bounds.max_x;
            entity.vel_x = -entity.vel_x;
        }
        if entity.x < bounds.min_x {
            entity.x = bounds.min_x;
            entity.vel_x = -entity.vel_x;
        }
        if entity.y > bounds.max_y {
            entity.y = bounds.max_y;
            entity.vel_y = -entity.vel_y;
        }
        if entity.y < bounds.min_y {
            entity.y = bounds.min_y;
            entity.vel_y = -entity.vel_y;
        }
    }

    /// Move exactly one cell, snapped to cell centers and clamped to the grid
    pub fn step_on_grid(entity: &mut EntityState, world: &WorldConfig, dir: Direction) {
        let bounds = Bounds::grid(world);
        let (dx, dy) = dir.offset();

        let x = snap_to_cell(entity.x, world.grid_size) + dx * world.grid_size;
        let y = snap_to_cell(entity.y, world.grid_size) + dy * world.grid_size;

        entity.x = x.clamp(bounds.min_x, bounds.max_x);
        entity.y = y.clamp(bounds.min_y, bounds.max_y);
        entity.facing = Some(dir);
    }

    /// Spend accumulated progress on whole grid moves.
    ///
    /// `progress_ms` is only ever reduced by whole multiples of
    /// `effective_ms`; leftover progress carries into the next tick.
    /// Returns the number of moves consumed.
    pub fn advance_grid<F>(
        entity: &mut EntityState,
        world: &WorldConfig,
        progress_ms: &mut f64,
        delta_ms: f64,
        effective_ms: f64,
        mut direction: F,
    ) -> u32
    where
        F: FnMut() -> Option<Direction>,
    {
        *progress_ms += delta_ms.max(0.0);
        if effective_ms <= 0.0 {
            return 0;
        }

        let mut moves = 0;
        while *progress_ms >= effective_ms {
            *progress_ms -= effective_ms;
            moves += 1;
            if let Some(dir) = direction() {
                Self::step_on_grid(entity, world, dir);
            }
        }
        moves
    }
}

/// Nearest cell center for a coordinate
fn snap_to_cell(v: f64, grid: f64) -> f64 {
    (v / grid).floor() * grid + grid / 2.0
}

/// Round to two decimal places for the wire
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
