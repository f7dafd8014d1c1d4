//! Peer directory.
//!
//! Caches every peer record the client has seen (conversation rows, search
//! results, selections) so a stable [`Peer`] can be resolved from an id.

use std::collections::HashMap;

use tracing::debug;

use toki_shared::constants::MIN_SEARCH_LEN;
use toki_shared::models::Peer;
use toki_shared::types::PeerId;

#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, Peer>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `query` is long enough to be sent to the search endpoint.
    pub fn is_searchable(query: &str) -> bool {
        query.trim().chars().count() >= MIN_SEARCH_LEN
    }

    /// Insert or refresh a peer record.
    pub fn record(&mut self, peer: &Peer) {
        self.peers.insert(peer.id.clone(), peer.clone());
    }

    pub fn record_all<'a>(&mut self, peers: impl IntoIterator<Item = &'a Peer>) {
        let mut count = 0usize;
        for peer in peers {
            self.record(peer);
            count += 1;
        }
        debug!(count, known = self.peers.len(), "peer directory updated");
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// Returns `true` if the peer was known.
    pub fn set_presence(&mut self, id: &PeerId, is_online: bool) -> bool {
        match self.peers.get_mut(id) {
            Some(peer) => {
                peer.is_online = is_online;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
