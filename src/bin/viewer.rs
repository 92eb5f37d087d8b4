//! Headless viewer: connects to the server, interpolates snapshots at a
//! fixed frame rate and logs the rendered pose.
//!
//! Environment:
//! - `VIEWER_URL` (default `ws://127.0.0.1:9001/ws`)
//! - `VIEWER_TOKEN` session token, appended as `?token=`
//! - `VIEWER_START` send a start request after connecting when `true`

use std::time::{Duration, Instant};

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hero_sync::client::Interpolator;
use hero_sync::ws::protocol::ServerMsg;

const FRAME: Duration = Duration::from_micros(16_667);
const FRAMES_PER_LOG: u32 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let base = std::env::var("VIEWER_URL").unwrap_or_else(|_| "ws://127.0.0.1:9001/ws".to_string());
    let url = match std::env::var("VIEWER_TOKEN") {
        Ok(token) => format!("{}?token={}", base, token),
        Err(_) => base,
    };
    let send_start = std::env::var("VIEWER_START").map(|v| v == "true").unwrap_or(false);

    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("connect {}", url))?;
    info!("Connected");
    let (mut sink, mut stream) = ws.split();

    if send_start {
        sink.send(Message::Text(r#"{"type":"game_start_request"}"#.to_string()))
            .await?;
    }

    let mut interp = Interpolator::new();
    let mut frames = tokio::time::interval(FRAME);
    let mut frame_count = 0u32;

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "Connection error");
                        break;
                    }
                };
                match serde_json::from_str::<ServerMsg>(&text) {
                    Ok(msg) => {
                        if !interp.integrate(&msg, Instant::now()) {
                            log_event(&msg);
                        }
                    }
                    Err(e) => warn!(error = %e, "Unreadable server message"),
                }
            }
            _ = frames.tick() => {
                frame_count += 1;
                if frame_count % FRAMES_PER_LOG == 0 && interp.has_state() {
                    let pose = interp.sample(Instant::now());
                    info!(x = format!("{:.2}", pose.x), y = format!("{:.2}", pose.y), size = pose.size, color = %pose.color, "Pose");
                }
            }
        }
    }

    interp.reset();
    Ok(())
}

fn log_event(msg: &ServerMsg) {
    match msg {
        ServerMsg::GameStatus { message } => info!(status = %message, "Game status"),
        ServerMsg::ChatMessage { user, message } => info!(user = %user, "{}", message),
        ServerMsg::Error { message } => warn!(error = %message, "Server error"),
        ServerMsg::GameStateUpdate { .. } => {}
    }
}
