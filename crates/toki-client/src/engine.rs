//! The sync engine: sole writer of the conversation registry, the message
//! logs, the peer directory and the active session.
//!
//! Every public `&mut self` method is one atomic transition.  Work that
//! crosses the process boundary is not performed here; it is queued as an
//! [`Effect`] and drained by the runtime after the transition completes, so
//! no caller ever observes a half-applied update.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use toki_shared::constants::CONVERSATIONS_LOAD_FAILED;
use toki_shared::models::{Conversation, Message, Peer};
use toki_shared::protocol::{
    EditMessage, InboundEvent, MarkRead, MessageEdited, MessagesRead, NewMessage, OutboundEvent,
    SendMessage,
};
use toki_shared::types::{MessageId, PeerId, TempId};

use crate::active::ActiveSession;
use crate::api::ApiError;
use crate::directory::PeerDirectory;
use crate::error::{ClientError, Result};
use crate::message_log::MessageLogStore;
use crate::registry::{ConversationRegistry, UnreadUpdate};

/// Boundary-crossing work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Push an event onto the event channel.
    Emit(OutboundEvent),
    /// Re-fetch the whole conversation list.
    RefreshConversations,
    /// Fetch the message history of one peer.
    FetchHistory(PeerId),
}

/// Loading state of the conversation list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    pub loading: bool,
    pub error: Option<String>,
}

/// Write-ahead record of a send awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub temp_id: TempId,
    pub peer: PeerId,
    pub content: String,
    pub queued_at: DateTime<Utc>,
}

/// Read-only copy of the engine state handed to presentation.
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub local_user: PeerId,
    pub conversations: Vec<Conversation>,
    pub focused: Option<Peer>,
    pub focused_log: Vec<Message>,
    pub status: RegistryStatus,
    pub pending_sends: Vec<PendingSend>,
}

/// Where an inbound confirmed message landed in its log.  Carries the
/// temporary id of the optimistic record it replaced, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    Appended,
    Confirmed(TempId),
    Duplicate(Option<TempId>),
}

pub struct SyncEngine {
    local_user: PeerId,
    directory: PeerDirectory,
    registry: ConversationRegistry,
    logs: MessageLogStore,
    active: ActiveSession,
    outbox: HashMap<TempId, PendingSend>,
    history_in_flight: HashSet<PeerId>,
    refresh_in_flight: bool,
    refresh_dirty: bool,
    status: RegistryStatus,
    effects: Vec<Effect>,
}

impl SyncEngine {
    pub fn new(local_user: PeerId) -> Self {
        Self {
            local_user,
            directory: PeerDirectory::new(),
            registry: ConversationRegistry::new(),
            logs: MessageLogStore::new(),
            active: ActiveSession::new(),
            outbox: HashMap::new(),
            history_in_flight: HashSet::new(),
            refresh_in_flight: false,
            refresh_dirty: false,
            status: RegistryStatus::default(),
            effects: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn local_user(&self) -> &PeerId {
        &self.local_user
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.registry.list()
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    pub fn log_for(&self, peer: &PeerId) -> &[Message] {
        self.logs.log_for(peer)
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn focused(&self) -> Option<&Peer> {
        self.active.focused()
    }

    pub fn status(&self) -> &RegistryStatus {
        &self.status
    }

    pub fn pending_sends(&self) -> Vec<PendingSend> {
        let mut pending: Vec<PendingSend> = self.outbox.values().cloned().collect();
        pending.sort_by_key(|p| p.queued_at);
        pending
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            local_user: self.local_user.clone(),
            conversations: self.registry.list(),
            focused: self.active.focused().cloned(),
            focused_log: self
                .active
                .focused_peer_id()
                .map(|p| self.logs.log_for(p).to_vec())
                .unwrap_or_default(),
            status: self.status.clone(),
            pending_sends: self.pending_sends(),
        }
    }

    /// Drain the effects queued by the transitions since the last call.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// Load (or reload) the conversation list from the backend.
    pub fn refresh_conversations(&mut self) {
        if self.refresh_in_flight {
            // The running fetch may predate the change that prompted this
            // one; fetch again once it lands.
            self.refresh_dirty = true;
            return;
        }
        self.refresh_in_flight = true;
        self.status.loading = true;
        self.effects.push(Effect::RefreshConversations);
    }

    pub fn select_conversation(&mut self, peer: Peer) {
        info!(peer = %peer.id, "select conversation");
        self.directory.record(&peer);
        if self.registry.ensure(peer.clone()) {
            debug!(peer = %peer.id, "conversation created by selection");
        }
        self.registry.reset_unread(&peer.id);

        let peer_id = peer.id.clone();
        let peer = self
            .registry
            .get(&peer_id)
            .map(|c| c.peer.clone())
            .unwrap_or(peer);
        self.active.focus(peer);

        if !self.logs.has_log(&peer_id) {
            self.request_history(&peer_id);
        }
        self.emit_read_receipts();
    }

    /// The "back" action.
    pub fn close_conversation(&mut self) {
        if let Some(peer) = self.active.focused_peer_id() {
            debug!(peer = %peer, "close conversation");
        }
        self.active.clear();
    }

    /// Append an optimistic message and emit the send request.  Returns the
    /// temporary id the confirmation will be correlated with.
    pub fn send_message(&mut self, peer_id: &PeerId, content: &str) -> Result<TempId> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyContent);
        }

        let temp_id = TempId::generate();
        let message = Message::optimistic(
            &temp_id,
            self.local_user.clone(),
            peer_id.clone(),
            content.to_string(),
        );

        self.logs.append(peer_id, message.clone());
        self.outbox.insert(
            temp_id.clone(),
            PendingSend {
                temp_id: temp_id.clone(),
                peer: peer_id.clone(),
                content: content.to_string(),
                queued_at: message.created_at,
            },
        );

        if !self.registry.touch(peer_id, message.clone(), UnreadUpdate::Reset) {
            match self.directory.get(peer_id).cloned() {
                Some(peer) => {
                    self.registry.ensure(peer);
                    self.registry.touch(peer_id, message, UnreadUpdate::Reset);
                }
                None => self.refresh_conversations(),
            }
        }

        info!(peer = %peer_id, temp_id = %temp_id, "message queued");
        self.effects.push(Effect::Emit(OutboundEvent::SendMessage(SendMessage {
            receiver_id: peer_id.clone(),
            content: content.to_string(),
            temp_id: temp_id.clone(),
        })));

        Ok(temp_id)
    }

    /// Request an edit of a message the local user wrote.  Local state only
    /// changes when the server confirms.
    pub fn edit_message(
        &mut self,
        message_id: &MessageId,
        new_content: &str,
        peer_id: &PeerId,
    ) -> Result<()> {
        let content = new_content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyContent);
        }

        let message = self
            .logs
            .get(peer_id, message_id)
            .ok_or_else(|| ClientError::MessageNotFound(message_id.clone()))?;
        if message.sender_id != self.local_user {
            return Err(ClientError::NotAuthor(message_id.clone()));
        }
        if message.is_optimistic {
            return Err(ClientError::MessagePending(message_id.clone()));
        }

        info!(peer = %peer_id, msg_id = %message_id, "edit requested");
        self.effects.push(Effect::Emit(OutboundEvent::EditMessage(EditMessage {
            message_id: message_id.clone(),
            content: content.to_string(),
            receiver_id: peer_id.clone(),
        })));
        Ok(())
    }

    /// Remove a conversation and its log.  Only called once the backend has
    /// acknowledged the deletion.
    pub fn complete_deletion(&mut self, peer_id: &PeerId) {
        let had_entry = self.registry.remove(peer_id).is_some();
        let dropped = self.logs.remove(peer_id).map(|log| log.len()).unwrap_or(0);
        self.outbox.retain(|_, pending| &pending.peer != peer_id);
        self.history_in_flight.remove(peer_id);
        if self.active.is_focused(peer_id) {
            self.active.clear();
        }
        info!(peer = %peer_id, had_entry, dropped, "conversation deleted");
    }

    pub fn record_search_results(&mut self, peers: &[Peer]) {
        self.directory.record_all(peers);
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    pub fn handle_inbound(&mut self, event: InboundEvent) {
        debug!(event = event.tag(), "inbound");
        match event {
            InboundEvent::NewMessage(new) => self.receive_message(new),
            InboundEvent::MessageEdited(edit) => self.apply_edit_confirmation(edit),
            InboundEvent::MessagesRead(MessagesRead {
                read_by,
                message_ids,
            }) => self.apply_read_receipt(&read_by, &message_ids),
            InboundEvent::UserOnline(change) => self.update_presence(&change.user_id, true),
            InboundEvent::UserOffline(change) => self.update_presence(&change.user_id, false),
        }
    }

    pub fn receive_message(&mut self, new: NewMessage) {
        let NewMessage { message, temp_id } = new;

        let self_authored = message.is_from(&self.local_user);
        if !self_authored && message.receiver_id != self.local_user {
            warn!(
                msg_id = %message.id,
                sender = %message.sender_id,
                receiver = %message.receiver_id,
                "message does not involve the local user, dropped"
            );
            return;
        }

        let peer_id = message.counterpart(&self.local_user).clone();
        let focused = self.active.is_focused(&peer_id);

        let placement = self.place(&peer_id, temp_id.as_ref(), message.clone());
        debug!(peer = %peer_id, msg_id = %message.id, ?placement, "message placed");

        match placement {
            Placement::Appended => {
                let unread = if focused || self_authored {
                    UnreadUpdate::Reset
                } else {
                    UnreadUpdate::Increment
                };
                if !self.registry.touch(&peer_id, message, unread) {
                    info!(peer = %peer_id, "message for unknown conversation, refreshing registry");
                    self.refresh_conversations();
                }
            }
            // The send was already counted as activity when it was queued;
            // later arrivals may have superseded it as lastMessage.
            Placement::Confirmed(temp) => {
                self.sync_replaced_last_message(&peer_id, &temp, &message.id);
            }
            Placement::Duplicate(temp) => {
                if let Some(temp) = temp {
                    self.sync_replaced_last_message(&peer_id, &temp, &message.id);
                }
                self.sync_last_message(&peer_id, &message.id);
            }
        }

        if focused {
            self.emit_read_receipts();
        }
    }

    /// Put a confirmed message into `peer`'s log, reconciling it with the
    /// optimistic record of the same send when there is one.
    fn place(&mut self, peer: &PeerId, temp_id: Option<&TempId>, message: Message) -> Placement {
        if let Some(temp) = temp_id {
            self.outbox.remove(temp);
        }
        let optimistic = self.matching_optimistic(peer, temp_id, &message);
        if let Some(ref temp) = optimistic {
            self.outbox.remove(temp);
        }

        if self.logs.get(peer, &message.id).is_some() {
            if let Some(ref temp) = optimistic {
                self.logs.discard_optimistic(peer, temp);
            }
            self.logs.update(peer, &message.id, |existing| absorb(existing, &message));
            return Placement::Duplicate(optimistic);
        }

        if let Some(temp) = optimistic {
            if self.logs.confirm(peer, &temp, message.clone()) {
                return Placement::Confirmed(temp);
            }
        }

        self.logs.append(peer, message);
        Placement::Appended
    }

    fn matching_optimistic(
        &self,
        peer: &PeerId,
        temp_id: Option<&TempId>,
        message: &Message,
    ) -> Option<TempId> {
        if let Some(temp) = temp_id {
            // An echoed id that no longer matches was already reconciled; do
            // not guess at another pending send with the same text.
            return self
                .logs
                .get(peer, &temp.as_message_id())
                .filter(|m| m.is_optimistic)
                .map(|_| temp.clone());
        }
        if !message.is_from(&self.local_user) {
            return None;
        }
        self.logs
            .oldest_optimistic_matching(peer, &self.local_user, &message.content)
            .map(|m| TempId(m.id.to_string()))
    }

    /// Mark `message_ids` in `reader_id`'s log as read.  Idempotent.
    pub fn apply_read_receipt(&mut self, reader_id: &PeerId, message_ids: &[MessageId]) {
        let mut changed = 0usize;
        for id in message_ids {
            self.logs.update(reader_id, id, |m| {
                if !m.is_read {
                    m.is_read = true;
                    changed += 1;
                }
            });
            self.sync_last_message(reader_id, id);
        }
        debug!(peer = %reader_id, requested = message_ids.len(), changed, "read receipt applied");
    }

    /// Apply a server-confirmed edit.  Unknown messages are ignored.
    pub fn apply_edit_confirmation(&mut self, edit: MessageEdited) {
        let MessageEdited {
            id,
            content,
            sender_id,
            receiver_id,
        } = edit;

        let peer = if sender_id == self.local_user {
            receiver_id.or_else(|| self.logs.locate(&id).cloned())
        } else {
            Some(sender_id)
        };
        let Some(peer) = peer else {
            debug!(msg_id = %id, "edit for unknown message ignored");
            return;
        };

        let applied = self.logs.update(&peer, &id, |m| {
            m.content = content;
            m.is_edited = true;
        });
        if !applied {
            debug!(peer = %peer, msg_id = %id, "edit for unknown message ignored");
            return;
        }
        self.sync_last_message(&peer, &id);
        info!(peer = %peer, msg_id = %id, "edit applied");
    }

    /// Presence never touches messages; only peer records change.
    pub fn update_presence(&mut self, peer_id: &PeerId, is_online: bool) {
        self.directory.set_presence(peer_id, is_online);
        self.registry.set_presence(peer_id, is_online);
        self.active.set_presence(peer_id, is_online);
        debug!(peer = %peer_id, is_online, "presence updated");
    }

    // ------------------------------------------------------------------
    // Completions of boundary work
    // ------------------------------------------------------------------

    pub fn apply_conversations(&mut self, result: std::result::Result<Vec<Conversation>, ApiError>) {
        self.refresh_in_flight = false;
        match result {
            Ok(conversations) => {
                info!(count = conversations.len(), "conversation list loaded");
                self.directory
                    .record_all(conversations.iter().map(|c| &c.peer));
                self.registry.replace_all(conversations);
                if let Some(peer) = self.active.focused().cloned() {
                    self.registry.ensure(peer.clone());
                    self.registry.reset_unread(&peer.id);
                }
                self.status = RegistryStatus::default();
            }
            Err(e) => {
                warn!(status = ?e.status, error = %e, "conversation list refresh failed");
                self.status.loading = false;
                self.status.error = Some(CONVERSATIONS_LOAD_FAILED.to_string());
            }
        }

        if self.refresh_dirty {
            self.refresh_dirty = false;
            self.refresh_conversations();
        }
    }

    pub fn apply_history(
        &mut self,
        peer_id: &PeerId,
        result: std::result::Result<Vec<Message>, ApiError>,
    ) {
        self.history_in_flight.remove(peer_id);

        if !self.registry.contains(peer_id) && !self.active.is_focused(peer_id) {
            debug!(peer = %peer_id, "history for a dropped conversation ignored");
            return;
        }

        match result {
            Ok(messages) => {
                info!(peer = %peer_id, count = messages.len(), "history loaded");
                for (temp, confirmed) in self.logs.replace(peer_id, messages) {
                    self.outbox.remove(&temp);
                    self.sync_replaced_last_message(peer_id, &temp, &confirmed);
                    debug!(peer = %peer_id, temp_id = %temp, msg_id = %confirmed, "send confirmed by history");
                }
            }
            // No log is created, so the next selection fetches again.
            Err(e) => {
                warn!(peer = %peer_id, status = ?e.status, error = %e, "history fetch failed");
            }
        }

        if self.active.is_focused(peer_id) {
            self.emit_read_receipts();
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn request_history(&mut self, peer_id: &PeerId) {
        if self.history_in_flight.insert(peer_id.clone()) {
            self.effects.push(Effect::FetchHistory(peer_id.clone()));
        }
    }

    /// Acknowledge every unread message the focused peer wrote.
    fn emit_read_receipts(&mut self) {
        let Some(peer) = self.active.focused_peer_id().cloned() else {
            return;
        };
        let message_ids = self.logs.mark_read_from(&peer, &peer);
        if message_ids.is_empty() {
            return;
        }

        self.registry.reset_unread(&peer);
        for id in &message_ids {
            self.sync_last_message(&peer, id);
        }
        info!(peer = %peer, count = message_ids.len(), "marking messages read");
        self.effects.push(Effect::Emit(OutboundEvent::MarkRead(MarkRead {
            message_ids,
            sender_id: peer,
        })));
    }

    /// Point a `lastMessage` that still names the optimistic record `temp`
    /// at its confirmed copy `confirmed`.
    fn sync_replaced_last_message(&mut self, peer: &PeerId, temp: &TempId, confirmed: &MessageId) {
        if let Some(message) = self.logs.get(peer, confirmed) {
            self.registry
                .refresh_last_message(peer, &temp.as_message_id(), message);
        }
    }

    /// Copy the log's version of `id` into the registry if it is the
    /// conversation's `lastMessage`.
    fn sync_last_message(&mut self, peer: &PeerId, id: &MessageId) {
        if let Some(message) = self.logs.get(peer, id) {
            self.registry.refresh_last_message(peer, id, message);
        }
    }
}

/// Merge a re-delivered confirmation into the stored copy.  Read and edit
/// flags only move forward, and an unedited copy never overwrites edited
/// content.
fn absorb(existing: &mut Message, incoming: &Message) {
    if incoming.is_edited || !existing.is_edited {
        existing.content = incoming.content.clone();
    }
    existing.created_at = incoming.created_at;
    existing.is_read |= incoming.is_read;
    existing.is_edited |= incoming.is_edited;
    existing.is_optimistic = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use toki_shared::protocol::PresenceChange;

    const ME: &str = "1";

    fn engine() -> SyncEngine {
        SyncEngine::new(PeerId::from(ME))
    }

    fn message(id: &str, from: &str, to: &str, content: &str) -> Message {
        Message {
            id: MessageId::from(id),
            sender_id: PeerId::from(from),
            receiver_id: PeerId::from(to),
            content: content.into(),
            created_at: Utc::now(),
            is_read: false,
            is_edited: false,
            is_optimistic: false,
        }
    }

    fn incoming(id: &str, from: &str, content: &str) -> NewMessage {
        NewMessage {
            message: message(id, from, ME, content),
            temp_id: None,
        }
    }

    fn with_conversations(engine: &mut SyncEngine, peers: &[(&str, &str)]) {
        engine.refresh_conversations();
        engine.apply_conversations(Ok(peers
            .iter()
            .map(|(id, name)| Conversation::new(Peer::new(*id, *name)))
            .collect()));
        engine.take_effects();
    }

    fn mark_reads(effects: &[Effect]) -> Vec<&MarkRead> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(OutboundEvent::MarkRead(m)) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn head(engine: &SyncEngine) -> PeerId {
        engine.conversations()[0].peer.id.clone()
    }

    #[test]
    fn send_appends_optimistic_and_promotes() {
        // Scenario A
        let mut engine = engine();
        with_conversations(&mut engine, &[("7", "bo"), ("42", "ana")]);
        let peer = PeerId::from(42u64);

        let temp = engine.send_message(&peer, "  hi ").unwrap();

        let log = engine.log_for(&peer);
        assert_eq!(log.len(), 1);
        assert!(log[0].is_optimistic);
        assert_eq!(log[0].content, "hi");
        assert_eq!(head(&engine), peer);
        assert_eq!(
            engine.conversations()[0].last_message.as_ref().unwrap().content,
            "hi"
        );

        let effects = engine.take_effects();
        assert_eq!(
            effects,
            vec![Effect::Emit(OutboundEvent::SendMessage(SendMessage {
                receiver_id: peer,
                content: "hi".into(),
                temp_id: temp.clone(),
            }))]
        );
        assert_eq!(engine.pending_sends()[0].temp_id, temp);
    }

    #[test]
    fn empty_send_is_rejected() {
        let mut engine = engine();
        let err = engine.send_message(&PeerId::from("42"), "   ").unwrap_err();
        assert!(matches!(err, ClientError::EmptyContent));
        assert!(engine.take_effects().is_empty());
        assert!(engine.log_for(&PeerId::from("42")).is_empty());
    }

    #[test]
    fn confirmation_with_temp_id_replaces_optimistic() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        let temp = engine.send_message(&peer, "hi").unwrap();
        engine.send_message(&peer, "second").unwrap();

        engine.receive_message(NewMessage {
            message: message("900", ME, "42", "hi"),
            temp_id: Some(temp.clone()),
        });

        let log = engine.log_for(&peer);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, MessageId::from("900"));
        assert!(!log[0].is_optimistic);
        assert!(log[1].is_optimistic);
        assert_eq!(engine.pending_sends().len(), 1);

        // The same confirmation delivered twice is absorbed.
        engine.receive_message(NewMessage {
            message: message("900", ME, "42", "hi"),
            temp_id: Some(temp),
        });
        assert_eq!(engine.log_for(&peer).len(), 2);
    }

    #[test]
    fn confirmation_without_temp_id_matches_oldest_by_content() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.send_message(&peer, "same").unwrap();
        engine.send_message(&peer, "same").unwrap();

        engine.receive_message(NewMessage {
            message: message("900", ME, "42", "same"),
            temp_id: None,
        });

        let log = engine.log_for(&peer);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, MessageId::from("900"));
        assert!(log[1].is_optimistic);
    }

    #[test]
    fn confirmation_after_history_does_not_duplicate() {
        let mut engine = engine();
        let peer = PeerId::from("42");
        engine.select_conversation(Peer::new("42", "ana"));
        let temp = engine.send_message(&peer, "hi").unwrap();

        // History raced ahead and already contains the confirmed send.
        engine.apply_history(&peer, Ok(vec![message("900", ME, "42", "hi")]));
        assert_eq!(engine.log_for(&peer).len(), 1);
        assert!(engine.pending_sends().is_empty());

        // The socket confirmation arriving afterwards is absorbed.
        engine.receive_message(NewMessage {
            message: message("900", ME, "42", "hi"),
            temp_id: Some(temp),
        });

        let log = engine.log_for(&peer);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, MessageId::from("900"));
        assert!(engine.pending_sends().is_empty());
    }

    #[test]
    fn unconfirmed_sends_stay_optimistic() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.send_message(&peer, "one").unwrap();
        engine.send_message(&peer, "two").unwrap();

        engine.receive_message(incoming("5", "42", "unrelated"));

        let optimistic = engine
            .log_for(&peer)
            .iter()
            .filter(|m| m.is_optimistic)
            .count();
        assert_eq!(optimistic, 2);
        assert_eq!(engine.pending_sends().len(), 2);
    }

    #[test]
    fn unread_counts_follow_focus() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana"), ("7", "bo")]);
        let ana = PeerId::from("42");
        let bo = PeerId::from("7");

        engine.receive_message(incoming("1", "42", "a"));
        engine.receive_message(incoming("2", "42", "b"));
        assert_eq!(engine.registry().get(&ana).unwrap().unread_count, 2);

        engine.select_conversation(Peer::new("7", "bo"));
        engine.receive_message(incoming("3", "7", "c"));
        assert_eq!(engine.registry().get(&bo).unwrap().unread_count, 0);
        assert_eq!(head(&engine), bo);
    }

    #[test]
    fn ordering_tracks_latest_activity() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("2", "b"), ("3", "c"), ("4", "d")]);

        engine.receive_message(incoming("m1", "4", "x"));
        assert_eq!(head(&engine), PeerId::from("4"));

        engine.send_message(&PeerId::from("3"), "y").unwrap();
        assert_eq!(head(&engine), PeerId::from("3"));

        engine.receive_message(NewMessage {
            message: message("m2", ME, "2", "z"),
            temp_id: None,
        });
        let order: Vec<String> = engine
            .conversations()
            .iter()
            .map(|c| c.peer.id.to_string())
            .collect();
        assert_eq!(order, ["2", "3", "4"]);
    }

    #[test]
    fn unknown_peer_triggers_refresh_and_keeps_message() {
        // Scenario B
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);

        engine.receive_message(incoming("m1", "77", "hello"));

        let peer = PeerId::from(77u64);
        assert_eq!(engine.log_for(&peer).len(), 1);
        assert_eq!(engine.log_for(&peer)[0].content, "hello");
        assert!(!engine.registry().contains(&peer));
        assert_eq!(engine.take_effects(), vec![Effect::RefreshConversations]);
        assert!(engine.status().loading);

        let mut row = Conversation::new(Peer::new("77", "new"));
        row.last_message = Some(message("m1", "77", ME, "hello"));
        row.unread_count = 1;
        engine.apply_conversations(Ok(vec![row, Conversation::new(Peer::new("42", "ana"))]));
        assert_eq!(head(&engine), peer);
        assert_eq!(engine.log_for(&peer).len(), 1);
        assert!(!engine.status().loading);
    }

    #[test]
    fn refresh_requested_during_refresh_runs_again() {
        let mut engine = engine();
        engine.refresh_conversations();
        engine.refresh_conversations();
        assert_eq!(engine.take_effects(), vec![Effect::RefreshConversations]);

        engine.apply_conversations(Ok(vec![]));
        assert_eq!(engine.take_effects(), vec![Effect::RefreshConversations]);

        engine.apply_conversations(Ok(vec![]));
        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn failed_refresh_keeps_stale_list() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);

        engine.refresh_conversations();
        assert_eq!(engine.take_effects(), vec![Effect::RefreshConversations]);
        engine.apply_conversations(Err(ApiError::new(Some(500), "boom")));

        assert_eq!(engine.conversations().len(), 1);
        assert_eq!(
            engine.status().error.as_deref(),
            Some(CONVERSATIONS_LOAD_FAILED)
        );
        assert!(!engine.status().loading);
        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn focusing_emits_one_receipt_for_all_unread() {
        // Scenario C
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.select_conversation(Peer::new("42", "ana"));
        engine.apply_history(&peer, Ok(vec![]));
        engine.close_conversation();
        engine.take_effects();

        for (id, text) in [("a", "1"), ("b", "2"), ("c", "3")] {
            engine.receive_message(incoming(id, "42", text));
        }
        assert_eq!(engine.registry().get(&peer).unwrap().unread_count, 3);
        assert!(engine.take_effects().is_empty());

        engine.select_conversation(Peer::new("42", "ana"));
        let effects = engine.take_effects();
        let receipts = mark_reads(&effects);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].sender_id, peer);
        assert_eq!(
            receipts[0].message_ids,
            vec![MessageId::from("a"), MessageId::from("b"), MessageId::from("c")]
        );
        assert_eq!(engine.registry().get(&peer).unwrap().unread_count, 0);
        assert!(!effects.iter().any(|e| matches!(e, Effect::FetchHistory(_))));

        // Nothing new to acknowledge on re-focus.
        engine.close_conversation();
        engine.select_conversation(Peer::new("42", "ana"));
        assert!(mark_reads(&engine.take_effects()).is_empty());
    }

    #[test]
    fn arrival_while_focused_emits_receipt() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        engine.select_conversation(Peer::new("42", "ana"));
        engine.take_effects();

        engine.receive_message(incoming("x", "42", "hey"));

        let effects = engine.take_effects();
        let receipts = mark_reads(&effects);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].message_ids, vec![MessageId::from("x")]);
        assert!(engine.log_for(&PeerId::from("42"))[0].is_read);
    }

    #[test]
    fn selecting_unknown_peer_creates_conversation_and_fetches_history() {
        let mut engine = engine();
        engine.select_conversation(Peer::new("9", "zed"));

        let peer = PeerId::from("9");
        assert!(engine.registry().contains(&peer));
        assert_eq!(engine.focused().unwrap().id, peer);
        assert_eq!(engine.take_effects(), vec![Effect::FetchHistory(peer.clone())]);

        // A second selection while the fetch runs does not fetch again.
        engine.select_conversation(Peer::new("9", "zed"));
        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn history_failure_yields_empty_log() {
        let mut engine = engine();
        let peer = PeerId::from("9");
        engine.select_conversation(Peer::new("9", "zed"));
        engine.take_effects();

        engine.apply_history(&peer, Err(ApiError::new(None, "offline")));

        assert!(engine.log_for(&peer).is_empty());
        assert!(engine.status().error.is_none());

        // Selecting again is the retry.
        engine.close_conversation();
        engine.select_conversation(Peer::new("9", "zed"));
        assert_eq!(engine.take_effects(), vec![Effect::FetchHistory(peer.clone())]);

        engine.apply_history(&peer, Ok(vec![message("m1", "9", ME, "back")]));
        assert_eq!(engine.log_for(&peer).len(), 1);
    }

    #[test]
    fn history_holding_confirmed_send_replaces_optimistic() {
        let mut engine = engine();
        let peer = PeerId::from("42");
        engine.select_conversation(Peer::new("42", "ana"));
        engine.send_message(&peer, "hi").unwrap();

        // The socket confirmation never arrives.
        engine.apply_history(&peer, Ok(vec![message("900", ME, "42", "hi")]));

        let log = engine.log_for(&peer);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, MessageId::from("900"));
        assert!(!log[0].is_optimistic);
        assert!(engine.pending_sends().is_empty());
        let last = engine.registry().get(&peer).unwrap().last_message.clone().unwrap();
        assert_eq!(last.id, MessageId::from("900"));
    }

    #[test]
    fn late_confirmation_keeps_newer_last_message() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana"), ("7", "bo")]);
        let peer = PeerId::from("42");
        let temp = engine.send_message(&peer, "A").unwrap();
        engine.receive_message(incoming("b", "42", "B"));
        engine.receive_message(incoming("c", "7", "C"));

        engine.receive_message(NewMessage {
            message: message("a", ME, "42", "A"),
            temp_id: Some(temp),
        });

        let contents: Vec<&str> = engine.log_for(&peer).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["A", "B"]);
        let conv = engine.registry().get(&peer).unwrap();
        assert_eq!(conv.last_message.as_ref().unwrap().id, MessageId::from("b"));
        assert_eq!(conv.unread_count, 1);
        // A confirmation is not new activity.
        assert_eq!(head(&engine), PeerId::from("7"));
    }

    #[test]
    fn confirmation_of_last_message_swaps_in_server_id() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        let temp = engine.send_message(&peer, "A").unwrap();

        engine.receive_message(NewMessage {
            message: message("a", ME, "42", "A"),
            temp_id: Some(temp),
        });

        let last = engine.registry().get(&peer).unwrap().last_message.clone().unwrap();
        assert_eq!(last.id, MessageId::from("a"));
        assert!(!last.is_optimistic);
    }

    #[test]
    fn redelivery_after_edit_keeps_edited_content() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.receive_message(incoming("m1", "42", "orig"));
        engine.apply_edit_confirmation(MessageEdited {
            id: MessageId::from("m1"),
            content: "edited".into(),
            sender_id: peer.clone(),
            receiver_id: None,
        });

        engine.receive_message(incoming("m1", "42", "orig"));

        let log = engine.log_for(&peer);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].content, "edited");
        assert!(log[0].is_edited);
        let last = engine.registry().get(&peer).unwrap().last_message.clone().unwrap();
        assert_eq!(last.content, "edited");
    }

    #[test]
    fn history_marks_focused_peer_messages_read() {
        let mut engine = engine();
        let peer = PeerId::from("42");
        engine.select_conversation(Peer::new("42", "ana"));
        engine.take_effects();

        let mut seen = message("old", "42", ME, "seen");
        seen.is_read = true;
        engine.apply_history(
            &peer,
            Ok(vec![seen, message("new", "42", ME, "fresh"), message("mine", ME, "42", "r")]),
        );

        let effects = engine.take_effects();
        let receipts = mark_reads(&effects);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].message_ids, vec![MessageId::from("new")]);
    }

    #[test]
    fn read_receipt_is_idempotent() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.receive_message(NewMessage {
            message: message("s1", ME, "42", "one"),
            temp_id: None,
        });
        engine.receive_message(NewMessage {
            message: message("s2", ME, "42", "two"),
            temp_id: None,
        });

        let ids = vec![MessageId::from("s1"), MessageId::from("s2")];
        engine.apply_read_receipt(&peer, &ids);
        let once: Vec<Message> = engine.log_for(&peer).to_vec();
        let once_list = engine.conversations();

        engine.apply_read_receipt(&peer, &ids);
        assert_eq!(engine.log_for(&peer), once.as_slice());
        assert_eq!(engine.conversations(), once_list);
        assert!(once.iter().all(|m| m.is_read));
        assert!(once_list[0].last_message.as_ref().unwrap().is_read);
    }

    #[test]
    fn edit_request_requires_authorship() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.receive_message(incoming("theirs", "42", "x"));
        engine.receive_message(NewMessage {
            message: message("mine", ME, "42", "y"),
            temp_id: None,
        });
        let temp = engine.send_message(&peer, "pending").unwrap();
        engine.take_effects();

        assert!(matches!(
            engine.edit_message(&MessageId::from("theirs"), "z", &peer),
            Err(ClientError::NotAuthor(_))
        ));
        assert!(matches!(
            engine.edit_message(&temp.as_message_id(), "z", &peer),
            Err(ClientError::MessagePending(_))
        ));
        assert!(matches!(
            engine.edit_message(&MessageId::from("nope"), "z", &peer),
            Err(ClientError::MessageNotFound(_))
        ));
        assert!(matches!(
            engine.edit_message(&MessageId::from("mine"), " ", &peer),
            Err(ClientError::EmptyContent)
        ));
        assert!(engine.take_effects().is_empty());

        engine.edit_message(&MessageId::from("mine"), " fixed ", &peer).unwrap();
        assert_eq!(
            engine.take_effects(),
            vec![Effect::Emit(OutboundEvent::EditMessage(EditMessage {
                message_id: MessageId::from("mine"),
                content: "fixed".into(),
                receiver_id: peer.clone(),
            }))]
        );
        // Not applied until confirmed.
        let mine = engine.log_for(&peer).iter().find(|m| m.id == MessageId::from("mine")).unwrap();
        assert_eq!(mine.content, "y");
        assert!(!mine.is_edited);
    }

    #[test]
    fn edit_confirmation_mutates_in_place() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana"), ("7", "bo")]);
        let peer = PeerId::from("42");
        engine.receive_message(NewMessage {
            message: message("mine", ME, "42", "tpyo"),
            temp_id: None,
        });
        engine.receive_message(incoming("other", "7", "later"));

        engine.apply_edit_confirmation(MessageEdited {
            id: MessageId::from("mine"),
            content: "typo".into(),
            sender_id: PeerId::from(ME),
            receiver_id: None,
        });

        let edited = &engine.log_for(&peer)[0];
        assert_eq!(edited.content, "typo");
        assert!(edited.is_edited);
        let conv = engine.registry().get(&peer).unwrap();
        assert_eq!(conv.last_message.as_ref().unwrap().content, "typo");
        // Edits are not activity.
        assert_eq!(head(&engine), PeerId::from("7"));
    }

    #[test]
    fn edit_confirmation_for_unknown_message_is_a_noop() {
        // Scenario D
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        engine.receive_message(incoming("m1", "42", "hello"));
        let before = engine.log_for(&PeerId::from("42")).to_vec();

        engine.apply_edit_confirmation(MessageEdited {
            id: MessageId::from("missing"),
            content: "x".into(),
            sender_id: PeerId::from("42"),
            receiver_id: None,
        });
        engine.apply_edit_confirmation(MessageEdited {
            id: MessageId::from("missing"),
            content: "x".into(),
            sender_id: PeerId::from(ME),
            receiver_id: None,
        });

        assert_eq!(engine.log_for(&PeerId::from("42")), before.as_slice());
        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn presence_never_touches_messages() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        let peer = PeerId::from("42");
        engine.receive_message(incoming("m1", "42", "hello"));
        engine.select_conversation(Peer::new("42", "ana"));
        let log_before = engine.log_for(&peer).to_vec();
        let last_before = engine.registry().get(&peer).unwrap().last_message.clone();

        engine.handle_inbound(InboundEvent::UserOnline(PresenceChange {
            user_id: PeerId::from(42u64),
            username: None,
        }));

        assert!(engine.registry().get(&peer).unwrap().peer.is_online);
        assert!(engine.focused().unwrap().is_online);
        assert!(engine.directory().get(&peer).unwrap().is_online);
        assert_eq!(engine.log_for(&peer), log_before.as_slice());
        assert_eq!(engine.registry().get(&peer).unwrap().last_message, last_before);

        engine.update_presence(&peer, false);
        assert!(!engine.focused().unwrap().is_online);
    }

    #[test]
    fn deletion_removes_conversation_log_and_focus() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana"), ("7", "bo")]);
        let peer = PeerId::from("42");
        engine.select_conversation(Peer::new("42", "ana"));
        engine.send_message(&peer, "bye").unwrap();

        engine.complete_deletion(&peer);

        assert!(!engine.registry().contains(&peer));
        assert!(engine.log_for(&peer).is_empty());
        assert!(engine.focused().is_none());
        assert!(engine.pending_sends().is_empty());
        assert_eq!(engine.conversations().len(), 1);

        // A late history result does not resurrect the log.
        engine.apply_history(&peer, Ok(vec![message("x", "42", ME, "late")]));
        assert!(engine.log_for(&peer).is_empty());
    }

    #[test]
    fn message_not_involving_local_user_is_dropped() {
        let mut engine = engine();
        engine.receive_message(NewMessage {
            message: message("x", "5", "6", "stray"),
            temp_id: None,
        });
        assert!(engine.log_for(&PeerId::from("5")).is_empty());
        assert!(engine.log_for(&PeerId::from("6")).is_empty());
        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn snapshot_reflects_focus() {
        let mut engine = engine();
        with_conversations(&mut engine, &[("42", "ana")]);
        engine.receive_message(incoming("m1", "42", "hello"));
        engine.select_conversation(Peer::new("42", "ana"));

        let snap = engine.snapshot();
        assert_eq!(snap.local_user, PeerId::from(ME));
        assert_eq!(snap.focused.unwrap().id, PeerId::from("42"));
        assert_eq!(snap.focused_log.len(), 1);
        assert_eq!(snap.conversations.len(), 1);
    }
}
