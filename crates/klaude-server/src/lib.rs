//! Observer transport for the session log: a websocket feed for viewers and
//! a small HTTP API for health, polling and out-of-process producers.

pub mod config;
pub mod connection;
pub mod error;
pub mod server;
pub mod wire;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{build_router, start, AppState, ServerHandle};
