use thiserror::Error;

use toki_shared::types::MessageId;
use toki_store::StoreError;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Message content is empty")]
    EmptyContent,

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Only the author can edit message {0}")]
    NotAuthor(MessageId),

    #[error("Message {0} is not confirmed yet")]
    MessagePending(MessageId),

    #[error("No stored session, log in first")]
    NotAuthenticated,

    /// The REST collaborator refused the request; local state is untouched.
    #[error("Request rejected: {0}")]
    Rejected(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sync engine has stopped")]
    EngineStopped,
}

pub type Result<T> = std::result::Result<T, ClientError>;
