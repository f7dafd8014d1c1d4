//! # toki-client
//!
//! Client-side sync engine for Toki direct messages: the conversation list,
//! per-peer message logs, optimistic sends and read receipts, kept
//! consistent across user actions, event-channel pushes and REST fetches.

pub mod active;
pub mod api;
pub mod auth;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod message_log;
pub mod registry;
pub mod runtime;
pub mod transport;

mod bridge;

use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use toki_store::Database;

use crate::api::HttpApi;
use crate::config::ClientConfig;

pub use api::{ApiError, HistoryApi};
pub use engine::{Effect, SyncEngine, SyncSnapshot};
pub use error::{ClientError, Result};
pub use runtime::{spawn_runtime, SyncHandle};
pub use transport::{EventChannel, TransportEnd};

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toki_client=debug,toki_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Open the database named by `config`, falling back to the platform data
/// directory.
pub fn open_database(config: &ClientConfig) -> Result<Database> {
    let db = match config.db_path {
        Some(ref path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    Ok(db)
}

/// Start the sync runtime for the persisted session.
///
/// Fails with [`ClientError::NotAuthenticated`] when nobody is logged in.
/// Must be called from within a tokio runtime.
pub fn start(
    config: &ClientConfig,
    channel: EventChannel,
) -> Result<(SyncHandle<HttpApi>, JoinHandle<()>)> {
    let db = open_database(config)?;
    let session = auth::restore(&db)?;

    tracing::info!(
        user = %session.user.id,
        api = %config.api_url,
        socket = %config.socket_url,
        "Starting Toki sync engine"
    );

    let api = HttpApi::new(config)?.with_token(session.access_token);
    Ok(spawn_runtime(
        session.user.id,
        api,
        channel,
        config.event_buffer,
    ))
}
