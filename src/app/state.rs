//! Application state shared across routes

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::game::{Engine, EngineHandle};
use crate::http::middleware::{Authenticator, TokenAuthenticator};
use crate::store::{ChatStore, MemoryChatStore, RestChatStore};
use crate::ws::{ConnectionRegistry, MessageRouter};

/// Bound on the in-memory chat history when no external store is set
const MEMORY_CHAT_CAPACITY: usize = 500;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub engine: EngineHandle,
    pub chat: Arc<dyn ChatStore>,
    pub auth: Arc<dyn Authenticator>,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    /// Build shared state and the engine that must be spawned to serve it
    pub fn new(config: Config) -> (Self, Engine) {
        let config = Arc::new(config);

        // Registry first: the engine broadcasts through it
        let registry = Arc::new(ConnectionRegistry::new());
        let (engine, handle) = Engine::new(&config, registry.clone());

        let chat: Arc<dyn ChatStore> = match &config.chat_store_url {
            Some(url) => {
                info!(url = %url, "Using REST chat store");
                Arc::new(RestChatStore::new(
                    url,
                    config.chat_store_key.clone(),
                    Duration::from_millis(config.chat_timeout_ms),
                ))
            }
            None => {
                info!("CHAT_STORE_URL not set, keeping chat history in memory");
                Arc::new(MemoryChatStore::new(MEMORY_CHAT_CAPACITY))
            }
        };

        let auth: Arc<dyn Authenticator> =
            Arc::new(TokenAuthenticator::new(config.auth_token_secret.clone()));
        let router = Arc::new(MessageRouter::new(config.players.clone()));

        let state = Self {
            config,
            registry,
            engine: handle,
            chat,
            auth,
            router,
        };
        (state, engine)
    }
}
