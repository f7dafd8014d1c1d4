use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::Message;
use crate::types::{MessageId, PeerId, TempId};

/// Events pushed by the server over the persistent event channel.
///
/// Envelope: `{ "event": "<name>", "data": { ... } }`.  The legacy names the
/// server used before the rename are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A confirmed message, sent or received by the local user.
    #[serde(alias = "receive_message")]
    NewMessage(NewMessage),

    /// An edit was accepted by the server.
    #[serde(alias = "message_updated")]
    MessageEdited(MessageEdited),

    /// The peer has viewed messages the local user sent.
    MessagesRead(MessagesRead),

    UserOnline(PresenceChange),
    UserOffline(PresenceChange),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub message: Message,
    /// Echo of the optimistic send this message confirms, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<TempId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdited {
    pub id: MessageId,
    pub content: String,
    pub sender_id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub read_by: PeerId,
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl InboundEvent {
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Log-safe event tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            InboundEvent::NewMessage(_) => "new_message",
            InboundEvent::MessageEdited(_) => "message_edited",
            InboundEvent::MessagesRead(_) => "messages_read",
            InboundEvent::UserOnline(_) => "user_online",
            InboundEvent::UserOffline(_) => "user_offline",
        }
    }
}

/// Requests the client emits on the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    SendMessage(SendMessage),
    EditMessage(EditMessage),
    MarkRead(MarkRead),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub receiver_id: PeerId,
    pub content: String,
    pub temp_id: TempId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub message_id: MessageId,
    pub content: String,
    pub receiver_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRead {
    pub message_ids: Vec<MessageId>,
    /// The peer who authored the messages being acknowledged.
    pub sender_id: PeerId,
}

impl OutboundEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            OutboundEvent::SendMessage(_) => "send_message",
            OutboundEvent::EditMessage(_) => "edit_message",
            OutboundEvent::MarkRead(_) => "mark_read",
        }
    }
}
