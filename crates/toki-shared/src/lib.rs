//! # toki-shared
//!
//! Types shared by every Toki crate: canonical identifiers, the domain
//! records exchanged with the backend, and the event-channel and REST
//! payloads.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod rest;
pub mod types;

pub use error::ProtocolError;
pub use models::{Conversation, Message, Peer};
pub use types::{MessageId, PeerId, TempId};
