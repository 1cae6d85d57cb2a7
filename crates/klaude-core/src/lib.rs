pub mod errors;
pub mod events;
pub mod ids;
pub mod model;
pub mod tools;

pub use errors::{InvalidEventError, ModelError};
pub use events::{Event, EventKind, NewEvent, ToolOutcome};
pub use ids::{EventId, ObserverId, SessionId, TaskId, ToolCallId};
