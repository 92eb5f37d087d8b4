//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Grid-facing movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Order in which simultaneously held directions win
    pub const PRECEDENCE: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit step in world axes (y grows downward)
    pub fn offset(self) -> (f64, f64) {
        match self {
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(()),
        }
    }
}

/// Held directional keys as sent by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
}

impl InputState {
    pub fn is_held(&self, dir: Direction) -> bool {
        match dir {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn set(&mut self, dir: Direction, held: bool) {
        match dir {
            Direction::Up => self.up = held,
            Direction::Down => self.down = held,
            Direction::Left => self.left = held,
            Direction::Right => self.right = held,
        }
    }
}

/// Auto-move toggle as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMoveState {
    pub active: bool,
    pub direction: Direction,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Held directions for a player
    PlayerInput {
        player: String,
        #[serde(rename = "inputState")]
        input_state: InputState,
        /// Client-side input counter
        sequence: u64,
    },

    GameStartRequest {},
    GameStopRequest {},
    GamePauseRequest {},
    GameResumeRequest {},

    /// Chat text, persisted then relayed to everyone else
    ChatMessage {
        #[serde(default)]
        message: String,
    },

    /// Flip auto-move, optionally choosing its direction
    ToggleAutomove {
        player: String,
        /// Validated by the router so a bad value gets its own error text
        #[serde(default)]
        direction: Option<String>,
    },

    SetHeroSpeed {
        player: String,
        multiplier: f64,
    },
}

impl ClientMsg {
    /// Wire discriminators the router accepts
    pub const TYPES: [&'static str; 8] = [
        "player_input",
        "game_start_request",
        "game_stop_request",
        "game_pause_request",
        "game_resume_request",
        "chat_message",
        "toggle_automove",
        "set_hero_speed",
    ];
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Authoritative snapshot (sent every tick and after control events)
    #[serde(rename_all = "camelCase")]
    GameStateUpdate {
        entity: EntityView,
        world: WorldView,
        /// Server tick rate in ticks per second
        server_rate: f64,
        /// Real-time duration of one move at the current speed
        effective_move_duration_ms: f64,
        auto_move: AutoMoveState,
        last_processed_sequence: u64,
        running: bool,
        paused: bool,
    },

    /// Lifecycle notice
    GameStatus {
        message: String,
    },

    /// Chat line or system notice
    ChatMessage {
        user: String,
        message: String,
    },

    /// Error message
    Error {
        message: String,
    },
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::ChatMessage {
            user: "System".to_string(),
            message: message.into(),
        }
    }
}

/// Entity pose with coordinates rounded for the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub color: String,
}

/// World geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldView {
    pub width: f64,
    pub height: f64,
    pub grid_size: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}
