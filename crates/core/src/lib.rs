//! Core data types shared by the swarmlink crates

pub mod message;
pub mod types;

pub use message::{Envelope, ReceivedMessage};
pub use types::{MessageId, NodeId, Seq};
