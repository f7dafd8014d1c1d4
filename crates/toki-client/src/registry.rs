//! Conversation registry.
//!
//! Ordered index of known conversations, most recently active first.  The
//! order is never sorted: a conversation that sees activity is removed and
//! reinserted at the head.

use std::collections::VecDeque;

use toki_shared::models::{Conversation, Message, Peer};
use toki_shared::types::{MessageId, PeerId};

/// How a new `lastMessage` affects the unread counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadUpdate {
    Increment,
    Reset,
    Keep,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationRegistry {
    entries: VecDeque<Conversation>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot in display order.
    pub fn list(&self) -> Vec<Conversation> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.position(peer).is_some()
    }

    pub fn get(&self, peer: &PeerId) -> Option<&Conversation> {
        self.entries.iter().find(|c| c.peer_id() == peer)
    }

    fn position(&self, peer: &PeerId) -> Option<usize> {
        self.entries.iter().position(|c| c.peer_id() == peer)
    }

    /// Add an empty conversation at the head unless one already exists.
    /// Returns `true` if a new entry was created.
    pub fn ensure(&mut self, peer: Peer) -> bool {
        if self.contains(&peer.id) {
            return false;
        }
        self.entries.push_front(Conversation::new(peer));
        true
    }

    /// Record activity on an existing conversation: set `lastMessage`, apply
    /// the unread policy and promote it to the head.  Returns `false` if the
    /// peer has no entry.
    pub fn touch(&mut self, peer: &PeerId, message: Message, unread: UnreadUpdate) -> bool {
        let Some(idx) = self.position(peer) else {
            return false;
        };
        let Some(mut conversation) = self.entries.remove(idx) else {
            return false;
        };
        conversation.last_message = Some(message);
        match unread {
            UnreadUpdate::Increment => conversation.unread_count += 1,
            UnreadUpdate::Reset => conversation.unread_count = 0,
            UnreadUpdate::Keep => {}
        }
        self.entries.push_front(conversation);
        true
    }

    /// Replace `lastMessage` in place when it is the message identified by
    /// `old_id`.  Does not reorder.
    pub fn refresh_last_message(&mut self, peer: &PeerId, old_id: &MessageId, message: &Message) {
        if let Some(conversation) = self.entries.iter_mut().find(|c| c.peer_id() == peer) {
            if conversation
                .last_message
                .as_ref()
                .is_some_and(|last| &last.id == old_id)
            {
                conversation.last_message = Some(message.clone());
            }
        }
    }

    pub fn reset_unread(&mut self, peer: &PeerId) {
        if let Some(conversation) = self.entries.iter_mut().find(|c| c.peer_id() == peer) {
            conversation.unread_count = 0;
        }
    }

    /// Returns `true` if the peer had an entry.
    pub fn set_presence(&mut self, peer: &PeerId, is_online: bool) -> bool {
        match self.entries.iter_mut().find(|c| c.peer_id() == peer) {
            Some(conversation) => {
                conversation.peer.is_online = is_online;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<Conversation> {
        let idx = self.position(peer)?;
        self.entries.remove(idx)
    }

    /// Install the authoritative list, keeping its order.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        let mut seen = std::collections::HashSet::new();
        self.entries = conversations
            .into_iter()
            .filter(|c| seen.insert(c.peer_id().clone()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(id: &str, from: &str, to: &str) -> Message {
        Message {
            id: MessageId::from(id),
            sender_id: PeerId::from(from),
            receiver_id: PeerId::from(to),
            content: format!("content {id}"),
            created_at: Utc::now(),
            is_read: false,
            is_edited: false,
            is_optimistic: false,
        }
    }

    fn order(reg: &ConversationRegistry) -> Vec<String> {
        reg.iter().map(|c| c.peer_id().to_string()).collect()
    }

    #[test]
    fn touch_promotes_to_head() {
        let mut reg = ConversationRegistry::new();
        reg.ensure(Peer::new("1", "a"));
        reg.ensure(Peer::new("2", "b"));
        reg.ensure(Peer::new("3", "c"));
        assert_eq!(order(&reg), ["3", "2", "1"]);

        assert!(reg.touch(&PeerId::from("1"), msg("m1", "1", "0"), UnreadUpdate::Increment));
        assert_eq!(order(&reg), ["1", "3", "2"]);
        assert_eq!(reg.get(&PeerId::from("1")).unwrap().unread_count, 1);
    }

    #[test]
    fn touch_unknown_peer_is_refused() {
        let mut reg = ConversationRegistry::new();
        assert!(!reg.touch(&PeerId::from("9"), msg("m", "9", "0"), UnreadUpdate::Keep));
        assert!(reg.is_empty());
    }

    #[test]
    fn ensure_does_not_duplicate() {
        let mut reg = ConversationRegistry::new();
        assert!(reg.ensure(Peer::new("1", "a")));
        assert!(!reg.ensure(Peer::new("1", "a")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unread_policies() {
        let mut reg = ConversationRegistry::new();
        let peer = PeerId::from("1");
        reg.ensure(Peer::new("1", "a"));
        reg.touch(&peer, msg("m1", "1", "0"), UnreadUpdate::Increment);
        reg.touch(&peer, msg("m2", "1", "0"), UnreadUpdate::Increment);
        reg.touch(&peer, msg("m3", "0", "1"), UnreadUpdate::Keep);
        assert_eq!(reg.get(&peer).unwrap().unread_count, 2);
        reg.touch(&peer, msg("m4", "1", "0"), UnreadUpdate::Reset);
        assert_eq!(reg.get(&peer).unwrap().unread_count, 0);
    }

    #[test]
    fn refresh_last_message_only_matches_current_last() {
        let mut reg = ConversationRegistry::new();
        let peer = PeerId::from("1");
        reg.ensure(Peer::new("1", "a"));
        reg.touch(&peer, msg("m1", "0", "1"), UnreadUpdate::Keep);

        let mut edited = msg("m1", "0", "1");
        edited.content = "edited".into();
        reg.refresh_last_message(&peer, &MessageId::from("other"), &edited);
        assert_ne!(reg.get(&peer).unwrap().last_message.as_ref().unwrap().content, "edited");

        reg.refresh_last_message(&peer, &MessageId::from("m1"), &edited);
        assert_eq!(reg.get(&peer).unwrap().last_message.as_ref().unwrap().content, "edited");
    }

    #[test]
    fn replace_all_keeps_server_order_and_drops_duplicates() {
        let mut reg = ConversationRegistry::new();
        reg.ensure(Peer::new("9", "old"));
        reg.replace_all(vec![
            Conversation::new(Peer::new("2", "b")),
            Conversation::new(Peer::new("1", "a")),
            Conversation::new(Peer::new("2", "dup")),
        ]);
        assert_eq!(order(&reg), ["2", "1"]);
        assert_eq!(reg.get(&PeerId::from("2")).unwrap().peer.display_name, "b");
    }

    #[test]
    fn presence_and_removal() {
        let mut reg = ConversationRegistry::new();
        reg.ensure(Peer::new("1", "a"));
        assert!(reg.set_presence(&PeerId::from("1"), true));
        assert!(reg.get(&PeerId::from("1")).unwrap().peer.is_online);
        assert!(!reg.set_presence(&PeerId::from("2"), true));

        assert!(reg.remove(&PeerId::from("1")).is_some());
        assert!(reg.remove(&PeerId::from("1")).is_none());
    }
}
