//! Per-player input records and effective direction resolution

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ws::protocol::{AutoMoveState, Direction, InputState};
use crate::ws::registry::ConnectionId;

/// Input state for one player (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    /// Currently held manual directions
    pub held: InputState,
    /// Auto-move toggle and remembered direction
    pub auto_move: AutoMoveState,
    /// Highest input sequence applied so far
    pub last_sequence: u64,
    /// Movement speed multiplier, always within the configured bounds
    pub speed_multiplier: f64,
    /// Connections that have written this record
    pub contributors: HashSet<ConnectionId>,
}

impl Default for InputRecord {
    fn default() -> Self {
        Self {
            held: InputState::default(),
            auto_move: AutoMoveState {
                active: false,
                direction: Direction::Right,
            },
            last_sequence: 0,
            speed_multiplier: 1.0,
            contributors: HashSet::new(),
        }
    }
}

impl InputRecord {
    /// First held direction in precedence order
    pub fn manual_direction(&self) -> Option<Direction> {
        Direction::PRECEDENCE
            .into_iter()
            .find(|dir| self.held.is_held(*dir))
    }
}

/// Aggregates inputs from all connections, keyed by player id
#[derive(Debug)]
pub struct InputAggregator {
    records: HashMap<String, InputRecord>,
    speed_min: f64,
    speed_max: f64,
}

impl InputAggregator {
    pub fn new(speed_min: f64, speed_max: f64) -> Self {
        Self {
            records: HashMap::new(),
            speed_min,
            speed_max,
        }
    }

    fn record_mut(&mut self, player: &str, conn: Option<ConnectionId>) -> &mut InputRecord {
        let record = self.records.entry(player.to_string()).or_default();
        if let Some(conn) = conn {
            record.contributors.insert(conn);
        }
        record
    }

    /// Set a single directional flag.
    ///
    /// The sequence counter only moves forward, and only for activating inputs.
    pub fn set_input(
        &mut self,
        player: &str,
        conn: Option<ConnectionId>,
        action: Direction,
        is_active: bool,
        sequence: Option<u64>,
    ) {
        let record = self.record_mut(player, conn);
        record.held.set(action, is_active);

        if let (true, Some(seq)) = (is_active, sequence) {
            record.last_sequence = record.last_sequence.max(seq);
        }
    }

    /// Apply a full `player_input` state, one flag at a time
    pub fn apply_input_state(
        &mut self,
        player: &str,
        conn: Option<ConnectionId>,
        state: InputState,
        sequence: u64,
    ) {
        for dir in Direction::PRECEDENCE {
            self.set_input(player, conn, dir, state.is_held(dir), Some(sequence));
        }
        debug!(player = %player, sequence, ?state, "Applied player input");
    }

    /// Flip auto-move and return the resulting state
    pub fn toggle_auto_move(
        &mut self,
        player: &str,
        conn: Option<ConnectionId>,
        direction: Option<Direction>,
    ) -> AutoMoveState {
        let record = self.record_mut(player, conn);
        let activating = !record.auto_move.active;

        if activating {
            if let Some(dir) = direction.or_else(|| record.manual_direction()) {
                record.auto_move.direction = dir;
            }
        }
        record.auto_move.active = activating;
        record.auto_move
    }

    /// Store a clamped speed multiplier and return the stored value
    pub fn set_speed_multiplier(
        &mut self,
        player: &str,
        conn: Option<ConnectionId>,
        value: f64,
    ) -> f64 {
        let (min, max) = (self.speed_min, self.speed_max);
        let record = self.record_mut(player, conn);
        record.speed_multiplier = value.clamp(min, max);
        record.speed_multiplier
    }

    /// Direction the player's entity should move this tick, if any.
    ///
    /// Manual input wins over auto-move.
    pub fn resolve_effective_direction(&self, player: &str) -> Option<Direction> {
        let record = self.records.get(player)?;
        record.manual_direction().or_else(|| {
            record
                .auto_move
                .active
                .then_some(record.auto_move.direction)
        })
    }

    pub fn record(&self, player: &str) -> Option<&InputRecord> {
        self.records.get(player)
    }

    pub fn speed_multiplier(&self, player: &str) -> f64 {
        self.records
            .get(player)
            .map(|r| r.speed_multiplier)
            .unwrap_or(1.0)
    }

    pub fn auto_move(&self, player: &str) -> AutoMoveState {
        self.records
            .get(player)
            .map(|r| r.auto_move)
            .unwrap_or(InputRecord::default().auto_move)
    }

    pub fn last_sequence(&self, player: &str) -> u64 {
        self.records.get(player).map(|r| r.last_sequence).unwrap_or(0)
    }

    /// Forget `conn` as a contributor, returning the affected players.
    ///
    /// Held keys are released on every record `conn` wrote, since held flags
    /// are not attributed to a single connection. A record is dropped once
    /// its last contributor is gone.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Vec<String> {
        let mut affected = Vec::new();
        self.records.retain(|player, record| {
            if !record.contributors.remove(&conn) {
                return true;
            }
            affected.push(player.clone());
            record.held = InputState::default();
            !record.contributors.is_empty()
        });
        affected.sort();
        affected
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }
}
