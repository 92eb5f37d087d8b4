//! WebSocket surface: wire protocol, connection registry and routing

pub mod handler;
pub mod protocol;
pub mod registry;
pub mod router;

pub use registry::{ConnectionId, ConnectionRegistry, Identity, Outbound};
pub use router::{MessageRouter, ProtocolError, SessionContext};
