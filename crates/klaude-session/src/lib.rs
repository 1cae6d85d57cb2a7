//! Session event log and live synchronization.
//!
//! A [`SessionLog`] records conversation turns, tool invocations and nested
//! tasks as one ordered event stream, keeps a [`TaskTreeIndex`] of the nesting,
//! and fans events out to any number of attached observers.

pub mod broadcast;
pub mod index;
pub mod log;

pub use broadcast::{Broadcaster, Delivery, ObserverChannel, ObserverDeliveryFailure};
pub use index::{NodeId, NodeStatus, TaskTreeIndex};
pub use log::{SessionLog, DEFAULT_OBSERVER_QUEUE};
