//! Agent orchestration: the model/tool loop, sub-agents and built-in tools.
//!
//! Every step the [`Orchestrator`] takes is appended to the shared
//! [`klaude_session::SessionLog`]; observers never talk to the engine directly.

pub mod config;
pub mod error;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod runner;
pub mod tools;
pub mod truncate;

pub use config::EngineConfig;
pub use error::EngineError;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use registry::{ToolFilter, ToolRegistry};
pub use runner::Orchestrator;
