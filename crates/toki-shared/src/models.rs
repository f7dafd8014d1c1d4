//! Domain records shared by the wire layer and the sync engine.
//!
//! Field names follow the backend's camelCase JSON.  Anything the backend may
//! omit defaults to its "nothing happened yet" value so a partial payload
//! never fails the whole event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, PeerId, TempId};

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// The other identity in a one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: PeerId,
    #[serde(rename = "username", alias = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub is_online: bool,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_online: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: PeerId,
    pub receiver_id: PeerId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_edited: bool,
    /// Set only on locally-created messages awaiting confirmation.
    #[serde(default)]
    pub is_optimistic: bool,
}

impl Message {
    /// Build the local, unconfirmed record of a send.
    pub fn optimistic(
        temp_id: &TempId,
        sender_id: PeerId,
        receiver_id: PeerId,
        content: String,
    ) -> Self {
        Self {
            id: temp_id.as_message_id(),
            sender_id,
            receiver_id,
            content,
            created_at: Utc::now(),
            is_read: false,
            is_edited: false,
            is_optimistic: true,
        }
    }

    /// Whichever of sender/receiver is not `local`.
    pub fn counterpart(&self, local: &PeerId) -> &PeerId {
        if &self.sender_id == local {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn is_from(&self, peer: &PeerId) -> bool {
        &self.sender_id == peer
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Summary row of the conversation list.
///
/// The backend has shipped two shapes for this row: a flat user object with
/// `lastMessage`/`unreadCount` alongside, and a nested `otherUser` object.
/// Both deserialize into the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConversationWire")]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "otherUser")]
    pub peer: Peer,
    pub last_message: Option<Message>,
    pub unread_count: u32,
}

impl Conversation {
    pub fn new(peer: Peer) -> Self {
        Self {
            peer,
            last_message: None,
            unread_count: 0,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer.id
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationWire {
    #[serde(rename_all = "camelCase")]
    Nested {
        other_user: Peer,
        #[serde(default)]
        last_message: Option<Message>,
        #[serde(default)]
        unread_count: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Flat {
        #[serde(flatten)]
        peer: Peer,
        #[serde(default)]
        last_message: Option<Message>,
        #[serde(default)]
        unread_count: Option<u32>,
    },
}

impl From<ConversationWire> for Conversation {
    fn from(wire: ConversationWire) -> Self {
        let (peer, last_message, unread_count) = match wire {
            ConversationWire::Nested {
                other_user,
                last_message,
                unread_count,
            } => (other_user, last_message, unread_count),
            ConversationWire::Flat {
                peer,
                last_message,
                unread_count,
            } => (peer, last_message, unread_count),
        };
        Self {
            peer,
            last_message,
            unread_count: unread_count.unwrap_or(0),
        }
    }
}
