//! Inbound message decoding, validation and dispatch

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::game::{EngineCommand, EngineHandle, LifecycleRequest};
use crate::store::{ChatStore, NewChatMessage, StoreError};

use super::protocol::{ClientMsg, Direction, InputState, ServerMsg};
use super::registry::{ConnectionId, ConnectionRegistry, Identity};

/// Client-visible protocol and validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format.")]
    InvalidJson,

    #[error("Unknown message type.")]
    UnknownType,

    #[error("Invalid input.")]
    InvalidInput,

    #[error("Invalid player ID.")]
    InvalidPlayer,

    #[error("Invalid auto-move direction.")]
    InvalidDirection,

    #[error("Invalid speed data.")]
    InvalidSpeed,

    #[error("Chat message cannot be empty.")]
    EmptyChat,
}

/// A decoded, validated inbound request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Input {
        player: String,
        input_state: InputState,
        sequence: u64,
    },
    Lifecycle(LifecycleRequest),
    Chat {
        text: String,
    },
    ToggleAutoMove {
        player: String,
        direction: Option<Direction>,
    },
    SetSpeed {
        player: String,
        multiplier: f64,
    },
}

/// Everything a handler may touch on behalf of one connection
#[derive(Clone)]
pub struct SessionContext {
    pub conn: ConnectionId,
    pub identity: Identity,
    pub registry: Arc<ConnectionRegistry>,
    pub engine: EngineHandle,
    pub chat: Arc<dyn ChatStore>,
    pub chat_timeout: Duration,
}

impl SessionContext {
    pub fn reply(&self, msg: &ServerMsg) {
        if !self.registry.send_to(self.conn, msg) {
            debug!(conn_id = %self.conn, "Reply dropped, connection gone");
        }
    }
}

/// Routes inbound text frames to the engine or the chat relay
pub struct MessageRouter {
    players: Vec<String>,
}

impl MessageRouter {
    pub fn new(players: Vec<String>) -> Self {
        Self { players }
    }

    /// Parse and validate one raw message
    pub fn decode(&self, raw: &str) -> Result<Request, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;

        let msg_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::UnknownType)?;
        if !ClientMsg::TYPES.contains(&msg_type) {
            return Err(ProtocolError::UnknownType);
        }

        let payload_error = match msg_type {
            "toggle_automove" => ProtocolError::InvalidPlayer,
            "set_hero_speed" => ProtocolError::InvalidSpeed,
            _ => ProtocolError::InvalidInput,
        };
        let msg: ClientMsg = serde_json::from_value(value).map_err(|_| payload_error)?;

        match msg {
            ClientMsg::PlayerInput {
                player,
                input_state,
                sequence,
            } => Ok(Request::Input {
                player: self.check_player(player)?,
                input_state,
                sequence,
            }),
            ClientMsg::GameStartRequest {} => Ok(Request::Lifecycle(LifecycleRequest::Start)),
            ClientMsg::GameStopRequest {} => Ok(Request::Lifecycle(LifecycleRequest::Stop)),
            ClientMsg::GamePauseRequest {} => Ok(Request::Lifecycle(LifecycleRequest::Pause)),
            ClientMsg::GameResumeRequest {} => Ok(Request::Lifecycle(LifecycleRequest::Resume)),
            ClientMsg::ChatMessage { message } => {
                if message.trim().is_empty() {
                    return Err(ProtocolError::EmptyChat);
                }
                Ok(Request::Chat { text: message })
            }
            ClientMsg::ToggleAutomove { player, direction } => {
                let player = self.check_player(player)?;
                let direction = direction
                    .map(|d| d.parse::<Direction>())
                    .transpose()
                    .map_err(|_| ProtocolError::InvalidDirection)?;
                Ok(Request::ToggleAutoMove { player, direction })
            }
            ClientMsg::SetHeroSpeed { player, multiplier } => {
                let player = self.check_player(player)?;
                if !multiplier.is_finite() {
                    return Err(ProtocolError::InvalidSpeed);
                }
                Ok(Request::SetSpeed { player, multiplier })
            }
        }
    }

    fn check_player(&self, player: String) -> Result<String, ProtocolError> {
        if self.players.contains(&player) {
            Ok(player)
        } else {
            Err(ProtocolError::InvalidPlayer)
        }
    }

    /// Handle one raw message. Never fails: problems become error replies.
    pub async fn dispatch(&self, ctx: &SessionContext, raw: &str) {
        let request = match self.decode(raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(conn_id = %ctx.conn, error = %e, raw = %truncate(raw, 200), "Rejected inbound message");
                ctx.reply(&ServerMsg::error(e.to_string()));
                return;
            }
        };

        let command = match request {
            Request::Input {
                player,
                input_state,
                sequence,
            } => EngineCommand::SetInput {
                conn: ctx.conn,
                player,
                input_state,
                sequence,
            },
            Request::Lifecycle(request) => {
                info!(conn_id = %ctx.conn, user = %ctx.identity.display_name, ?request, "Lifecycle request");
                EngineCommand::Lifecycle(request)
            }
            Request::ToggleAutoMove { player, direction } => EngineCommand::ToggleAutoMove {
                conn: ctx.conn,
                player,
                direction,
            },
            Request::SetSpeed { player, multiplier } => EngineCommand::SetSpeed {
                conn: ctx.conn,
                player,
                multiplier,
            },
            Request::Chat { text } => {
                relay_chat(ctx, text).await;
                return;
            }
        };

        if let Err(e) = ctx.engine.send(command).await {
            error!(conn_id = %ctx.conn, error = %e, "Engine unavailable");
        }
    }
}

/// Persist a chat line, then relay it to everyone but the sender
async fn relay_chat(ctx: &SessionContext, text: String) {
    let message = NewChatMessage {
        user_id: ctx.identity.user_id.clone(),
        username: ctx.identity.display_name.clone(),
        message_text: text.clone(),
    };

    let stored = match tokio::time::timeout(ctx.chat_timeout, ctx.chat.persist(message)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable("timed out".to_string())),
    };

    if let Err(e) = stored {
        error!(conn_id = %ctx.conn, user = %ctx.identity.display_name, error = %e, "Failed to store chat message");
        ctx.reply(&ServerMsg::error("Error: Message not stored in database."));
        return;
    }

    debug!(user = %ctx.identity.display_name, "Chat message stored");
    ctx.registry.broadcast_except(
        &ServerMsg::ChatMessage {
            user: escape_html(&ctx.identity.display_name),
            message: escape_html(&text),
        },
        ctx.conn,
    );
}

/// Escape text for display inside HTML
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
