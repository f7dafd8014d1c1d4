use rusqlite::Connection;

/// Single-row table holding the last authenticated session.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS auth_session (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            user_json     TEXT NOT NULL,
            access_token  TEXT NOT NULL,
            refresh_token TEXT,
            saved_at      TEXT NOT NULL
        );",
    )
}
