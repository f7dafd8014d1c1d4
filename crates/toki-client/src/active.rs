//! Active session context: which conversation the user is looking at.

use toki_shared::models::Peer;
use toki_shared::types::PeerId;

#[derive(Debug, Clone, Default)]
pub struct ActiveSession {
    focused: Option<Peer>,
}

impl ActiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&mut self, peer: Peer) {
        self.focused = Some(peer);
    }

    /// The "back" action.
    pub fn clear(&mut self) {
        self.focused = None;
    }

    pub fn focused(&self) -> Option<&Peer> {
        self.focused.as_ref()
    }

    pub fn focused_peer_id(&self) -> Option<&PeerId> {
        self.focused.as_ref().map(|p| &p.id)
    }

    pub fn is_focused(&self, peer: &PeerId) -> bool {
        self.focused_peer_id() == Some(peer)
    }

    pub fn set_presence(&mut self, peer: &PeerId, is_online: bool) {
        if let Some(focused) = self.focused.as_mut().filter(|p| &p.id == peer) {
            focused.is_online = is_online;
        }
    }
}
