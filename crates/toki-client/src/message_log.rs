//! Per-peer message logs.
//!
//! Each log is kept in arrival/creation order, not by `createdAt`:
//! confirmations and history fetches interleave, and nothing downstream may
//! rely on global timestamp order.  Lookups by id are linear in one peer's
//! log.

use std::collections::{HashMap, HashSet};

use chrono::Duration;

use toki_shared::models::Message;
use toki_shared::types::{MessageId, PeerId, TempId};

/// Tolerated clock difference between a send's local timestamp and the
/// server's `createdAt` for the same message.
const CONFIRM_SKEW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct MessageLogStore {
    logs: HashMap<PeerId, Vec<Message>>,
}

impl MessageLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The log for `peer`; empty, never absent.
    pub fn log_for(&self, peer: &PeerId) -> &[Message] {
        self.logs.get(peer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a log has been created for `peer` (possibly empty).
    pub fn has_log(&self, peer: &PeerId) -> bool {
        self.logs.contains_key(peer)
    }

    pub fn append(&mut self, peer: &PeerId, message: Message) {
        self.logs.entry(peer.clone()).or_default().push(message);
    }

    pub fn get(&self, peer: &PeerId, id: &MessageId) -> Option<&Message> {
        self.log_for(peer).iter().find(|m| &m.id == id)
    }

    /// Mutate the message `id` in `peer`'s log.  Returns `false` if absent.
    pub fn update(&mut self, peer: &PeerId, id: &MessageId, f: impl FnOnce(&mut Message)) -> bool {
        let found = self
            .logs
            .get_mut(peer)
            .and_then(|log| log.iter_mut().find(|m| &m.id == id));
        match found {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }

    /// Find which log holds `id`.  Used only when the owning peer cannot be
    /// derived from the event itself.
    pub fn locate(&self, id: &MessageId) -> Option<&PeerId> {
        self.logs
            .iter()
            .find(|(_, log)| log.iter().any(|m| &m.id == id))
            .map(|(peer, _)| peer)
    }

    /// Replace the optimistic message created for `temp_id` with its
    /// confirmation, keeping its position.  Returns `false` if there is no
    /// such optimistic message.
    pub fn confirm(&mut self, peer: &PeerId, temp_id: &TempId, confirmed: Message) -> bool {
        let temp = temp_id.as_message_id();
        let Some(log) = self.logs.get_mut(peer) else {
            return false;
        };
        match log.iter_mut().find(|m| m.is_optimistic && m.id == temp) {
            Some(slot) => {
                *slot = confirmed;
                true
            }
            None => false,
        }
    }

    /// Drop the optimistic message created for `temp_id`.  Used when its
    /// confirmed copy is already in the log.
    pub fn discard_optimistic(&mut self, peer: &PeerId, temp_id: &TempId) -> bool {
        let temp = temp_id.as_message_id();
        let Some(log) = self.logs.get_mut(peer) else {
            return false;
        };
        let before = log.len();
        log.retain(|m| !(m.is_optimistic && m.id == temp));
        log.len() != before
    }

    /// Mark every unread message `author` wrote in `peer`'s log as read and
    /// return their ids in log order.
    pub fn mark_read_from(&mut self, peer: &PeerId, author: &PeerId) -> Vec<MessageId> {
        let Some(log) = self.logs.get_mut(peer) else {
            return Vec::new();
        };
        log.iter_mut()
            .filter(|m| &m.sender_id == author && !m.is_read && !m.is_optimistic)
            .map(|m| {
                m.is_read = true;
                m.id.clone()
            })
            .collect()
    }

    /// Oldest optimistic message in `peer`'s log sent by `sender` with
    /// exactly `content`.
    pub fn oldest_optimistic_matching(
        &self,
        peer: &PeerId,
        sender: &PeerId,
        content: &str,
    ) -> Option<&Message> {
        self.log_for(peer)
            .iter()
            .find(|m| m.is_optimistic && &m.sender_id == sender && m.content == content)
    }

    /// Install a fetched history for `peer`.
    ///
    /// Entries already in the local log but absent from `fetched` (sends
    /// still in flight, events that raced the fetch) are kept after the
    /// fetched messages in their existing order.  An optimistic entry whose
    /// confirmed copy is in `fetched` is dropped instead: oldest optimistic
    /// first, each paired with the earliest unclaimed fetched message from
    /// the same sender with the same content that the log did not already
    /// hold.  Returns the `(temp id, confirmed id)` pairs reconciled.
    pub fn replace(&mut self, peer: &PeerId, fetched: Vec<Message>) -> Vec<(TempId, MessageId)> {
        let previous = self.logs.remove(peer).unwrap_or_default();
        let known: HashSet<MessageId> = previous.iter().map(|m| m.id.clone()).collect();
        let fetched_ids: HashSet<MessageId> = fetched.iter().map(|m| m.id.clone()).collect();

        let mut claimed: HashSet<usize> = HashSet::new();
        let mut reconciled = Vec::new();
        let mut retained = Vec::new();

        for local in previous {
            if fetched_ids.contains(&local.id) {
                continue;
            }
            if local.is_optimistic {
                let earliest = local.created_at - Duration::minutes(CONFIRM_SKEW_MINUTES);
                let copy = fetched.iter().enumerate().find(|(idx, f)| {
                    !claimed.contains(idx)
                        && !known.contains(&f.id)
                        && !f.is_optimistic
                        && f.sender_id == local.sender_id
                        && f.content == local.content
                        && f.created_at >= earliest
                });
                if let Some((idx, confirmed)) = copy {
                    claimed.insert(idx);
                    reconciled.push((TempId(local.id.to_string()), confirmed.id.clone()));
                    continue;
                }
            }
            retained.push(local);
        }

        let mut log = fetched;
        log.extend(retained);
        self.logs.insert(peer.clone(), log);
        reconciled
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<Vec<Message>> {
        self.logs.remove(peer)
    }
}
