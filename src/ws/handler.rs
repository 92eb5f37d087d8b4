//! WebSocket upgrade handler and per-connection session

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use axum_extra::{headers::Cookie, TypedHeader};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::EngineCommand;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ServerMsg;
use crate::ws::registry::{Identity, Outbound};
use crate::ws::router::{escape_html, SessionContext};

/// Outbound frames buffered per connection before messages are dropped
const OUTBOUND_QUEUE: usize = 256;

const WELCOME_TEXT: &str = "Welcome to the chatroom! Messages you send may be stored.";

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The session token is read from `?token=`; only when the query carries
/// none is the `token` cookie consulted. A present but invalid query token
/// is rejected even if the cookie holds a valid one.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    cookies: Option<TypedHeader<Cookie>>,
    State(state): State<AppState>,
) -> Response {
    let token = query
        .token
        .or_else(|| cookies.and_then(|TypedHeader(c)| c.get("token").map(str::to_string)));

    // Reject before the upgrade so the core never sees the connection
    match state.auth.authenticate(token.as_deref()) {
        Ok(identity) => {
            info!(user_id = %identity.user_id, user = %identity.display_name, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let conn = Uuid::new_v4();
    info!(conn_id = %conn, user = %identity.display_name, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);

    state.registry.attach(conn, identity.clone(), tx);
    let writer_handle = tokio::spawn(run_writer(conn, ws_sink, rx));

    send_greeting(&state, conn).await;

    // Late joiners get the current state without waiting for a tick
    if let Err(e) = state.engine.send(EngineCommand::Sync { conn }).await {
        error!(conn_id = %conn, error = %e, "Engine unavailable on connect");
    }
    state.registry.broadcast_except(
        &ServerMsg::system(format!("User {} connected", identity.display_name)),
        conn,
    );

    let ctx = SessionContext {
        conn,
        identity,
        registry: state.registry.clone(),
        engine: state.engine.clone(),
        chat: state.chat.clone(),
        chat_timeout: Duration::from_millis(state.config.chat_timeout_ms),
    };
    run_reader(&state, &ctx, ws_stream).await;

    // Cleanup on disconnect
    if let Some(identity) = state.registry.detach(conn) {
        state.registry.broadcast(&ServerMsg::system(format!(
            "User {} disconnected",
            identity.display_name
        )));
    }
    if let Err(e) = state.engine.send(EngineCommand::Disconnected { conn }).await {
        debug!(conn_id = %conn, error = %e, "Engine gone before disconnect");
    }

    // The registry entry held the only sender; the writer drains and exits
    if let Err(e) = writer_handle.await {
        error!(conn_id = %conn, error = %e, "Writer task failed");
    }

    info!(conn_id = %conn, "WebSocket connection closed");
}

/// Welcome line and recent chat history for a new connection
async fn send_greeting(state: &AppState, conn: Uuid) {
    state.registry.send_to(conn, &ServerMsg::system(WELCOME_TEXT));

    let timeout = Duration::from_millis(state.config.chat_timeout_ms);
    let history = tokio::time::timeout(
        timeout,
        state.chat.fetch_recent(state.config.chat_history_limit),
    )
    .await;

    match history {
        Ok(Ok(records)) if records.is_empty() => {
            state
                .registry
                .send_to(conn, &ServerMsg::system("No recent messages found."));
        }
        Ok(Ok(records)) => {
            for record in records {
                state.registry.send_to(
                    conn,
                    &ServerMsg::ChatMessage {
                        user: escape_html(&record.username),
                        message: escape_html(&record.message_text),
                    },
                );
            }
        }
        Ok(Err(e)) => {
            error!(conn_id = %conn, error = %e, "Failed to fetch chat history");
            state
                .registry
                .send_to(conn, &ServerMsg::system("Could not retrieve recent messages."));
        }
        Err(_) => {
            error!(conn_id = %conn, "Chat history fetch timed out");
            state
                .registry
                .send_to(conn, &ServerMsg::system("Could not retrieve recent messages."));
        }
    }
}

/// Reader loop: WebSocket -> router
async fn run_reader(
    state: &AppState,
    ctx: &SessionContext,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
) {
    let rate_limiter = ConnectionRateLimiter::default();
    let conn = ctx.conn;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(conn_id = %conn, "Rate limited inbound message");
                    ctx.reply(&ServerMsg::error("Too many messages."));
                    continue;
                }
                state.router.dispatch(ctx, &text).await;
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn_id = %conn, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Writer loop: queued frames -> WebSocket
async fn run_writer(
    conn: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = rx.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = ws_sink.send(Message::Text(text.to_string())).await {
                    debug!(conn_id = %conn, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Outbound::Close => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = ws_sink.close().await;
}
