//! Login, registration and the persisted session the runtime starts from.

use chrono::Utc;
use tracing::info;

use toki_shared::rest::AuthResponse;
use toki_store::{AuthSession, Database, LocalUser};

use crate::api::HttpApi;
use crate::error::{ClientError, Result};

fn into_session(resp: AuthResponse) -> AuthSession {
    AuthSession {
        user: LocalUser {
            id: resp.user.id,
            username: resp.user.username,
            email: resp.user.email,
        },
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        saved_at: Utc::now(),
    }
}

pub async fn login(api: &HttpApi, db: &Database, email: &str, password: &str) -> Result<AuthSession> {
    let resp = api.login(email.trim(), password).await?;
    let session = into_session(resp);
    db.save_session(&session)?;
    info!(user = %session.user.id, "logged in");
    Ok(session)
}

pub async fn register(
    api: &HttpApi,
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
) -> Result<AuthSession> {
    let resp = api.register(username.trim(), email.trim(), password).await?;
    let session = into_session(resp);
    db.save_session(&session)?;
    info!(user = %session.user.id, "registered");
    Ok(session)
}

/// Forget the stored session.  Returns `true` if one existed.
pub fn logout(db: &Database) -> Result<bool> {
    let cleared = db.clear_session()?;
    info!(cleared, "logged out");
    Ok(cleared)
}

/// The session the sync engine may start with.
pub fn restore(db: &Database) -> Result<AuthSession> {
    db.load_session()?.ok_or(ClientError::NotAuthenticated)
}
