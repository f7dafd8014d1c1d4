//! # toki-store
//!
//! Local persisted state for the Toki client, backed by SQLite.
//!
//! Only what must survive a restart lives here: the last authenticated
//! identity and its credential tokens.  Conversations and message logs are
//! re-fetched from the backend on every start.

pub mod database;
pub mod migrations;
pub mod models;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
