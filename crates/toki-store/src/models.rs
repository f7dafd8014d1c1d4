//! Records persisted in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toki_shared::types::PeerId;

/// The local user's own account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    /// Backend user id; the sync engine compares senders against it.
    pub id: PeerId,
    pub username: String,
    pub email: Option<String>,
}

/// Credentials of the last successful login or registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub user: LocalUser,
    /// Bearer token attached to every REST request and the event channel
    /// handshake.
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// When this session was written locally.
    pub saved_at: DateTime<Utc>,
}
