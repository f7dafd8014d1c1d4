//! Persistence of the authenticated [`AuthSession`].

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{AuthSession, LocalUser};

impl Database {
    /// Store `session`, replacing any previous one.
    pub fn save_session(&self, session: &AuthSession) -> Result<()> {
        let user_json = serde_json::to_string(&session.user)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO auth_session (id, user_json, access_token, refresh_token, saved_at)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                user_json,
                session.access_token,
                session.refresh_token,
                session.saved_at.to_rfc3339(),
            ],
        )?;
        tracing::debug!(user = %session.user.id, "session saved");
        Ok(())
    }

    /// Load the stored session, if a user is logged in.
    pub fn load_session(&self) -> Result<Option<AuthSession>> {
        let row = self
            .conn()
            .query_row(
                "SELECT user_json, access_token, refresh_token, saved_at
                 FROM auth_session WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_json, access_token, refresh_token, saved_str)) = row else {
            return Ok(None);
        };

        let user: LocalUser = serde_json::from_str(&user_json)?;
        let saved_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&saved_str)?.with_timezone(&Utc);

        Ok(Some(AuthSession {
            user,
            access_token,
            refresh_token,
            saved_at,
        }))
    }

    /// Forget the stored session.  Returns `true` if one existed.
    pub fn clear_session(&self) -> Result<bool> {
        let affected = self.conn().execute("DELETE FROM auth_session WHERE id = 1", [])?;
        Ok(affected > 0)
    }
}
