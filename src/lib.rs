//! Hero Sync - authoritative tick-driven state synchronizer
//!
//! One server-owned entity is advanced on a fixed tick by either a
//! continuous bounce policy or a discrete grid policy, and every tick's
//! snapshot is fanned out to all connected viewers over WebSocket.
//! Viewers smooth the snapshots with [`client::Interpolator`].

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod store;
pub mod util;
pub mod ws;
