//! Data store modules for external persistence

pub mod chat;
pub mod rest;

pub use chat::{ChatRecord, ChatStore, MemoryChatStore, NewChatMessage, RestChatStore, StoreError};
pub use rest::RestClient;
