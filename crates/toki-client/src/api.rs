//! REST collaborator: conversation list, history, deletion, peer search and
//! authentication.
//!
//! The sync engine only depends on the [`HistoryApi`] trait; [`HttpApi`] is
//! the production implementation on top of `reqwest`.

use std::future::Future;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use toki_shared::models::{Conversation, Message, Peer};
use toki_shared::rest::{
    AuthResponse, ConversationsResponse, HistoryResponse, LoginRequest, RegisterRequest,
    SearchResponse,
};
use toki_shared::types::PeerId;

use crate::config::ClientConfig;
use crate::error::ClientError;

const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong";

/// Structured failure of a REST call: HTTP-style status plus a readable
/// message.  `status` is `None` when no response was received at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build an error from a non-success response body.
    ///
    /// The backend is inconsistent about where it puts the reason, so the
    /// body is checked in order: `message`, `error`, `errors[]`, a bare
    /// string, and finally the status line.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = extract_message(body)
            .or_else(|| {
                status
                    .canonical_reason()
                    .map(|reason| format!("{} {}", status.as_u16(), reason))
            })
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
        Self::new(Some(status.as_u16()), message)
    }

    /// A request that never produced a response (network, timeout, TLS).
    pub fn transport(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if message.trim().is_empty() {
            return Self::new(None, DEFAULT_ERROR_MESSAGE);
        }
        Self::new(err.status().map(|s| s.as_u16()), message)
    }
}

fn extract_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Some(body.to_string()),
    };

    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(msg) = value.get("message").and_then(non_empty) {
        return Some(msg);
    }
    if let Some(msg) = value.get("error").and_then(non_empty) {
        return Some(msg);
    }
    if let Some(errors) = value.get("errors").and_then(Value::as_array) {
        let joined = errors
            .iter()
            .filter_map(|e| {
                e.get("msg")
                    .and_then(non_empty)
                    .or_else(|| e.get("message").and_then(non_empty))
                    .or_else(|| non_empty(e))
            })
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    non_empty(&value)
}

/// Operations of the history/REST collaborator the sync engine relies on.
pub trait HistoryApi: Send + Sync + 'static {
    fn fetch_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send;

    fn fetch_history(
        &self,
        peer: &PeerId,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;

    fn delete_conversation(
        &self,
        peer: &PeerId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn search_peers(&self, query: &str)
        -> impl Future<Output = Result<Vec<Peer>, ApiError>> + Send;
}

/// `reqwest`-backed REST client.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach the bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "api request");
        let builder = self.client.request(method, url);
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = builder.send().await.map_err(ApiError::transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.send(builder).await?;
        let status = resp.status().as_u16();
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::new(Some(status), format!("Invalid response: {e}")))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.send_json(
            self.request(Method::POST, "/auth/login")
                .json(&LoginRequest { email, password }),
        )
        .await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        self.send_json(
            self.request(Method::POST, "/auth/register")
                .json(&RegisterRequest {
                    username,
                    email,
                    password,
                }),
        )
        .await
    }
}

impl HistoryApi for HttpApi {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let resp: ConversationsResponse =
            self.send_json(self.request(Method::GET, "/messages")).await?;
        Ok(resp.conversations)
    }

    async fn fetch_history(&self, peer: &PeerId) -> Result<Vec<Message>, ApiError> {
        let resp: HistoryResponse = self
            .send_json(self.request(Method::GET, &format!("/messages/{peer}")))
            .await?;
        Ok(resp.messages)
    }

    async fn delete_conversation(&self, peer: &PeerId) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("/messages/conversations/{peer}")))
            .await?;
        Ok(())
    }

    async fn search_peers(&self, query: &str) -> Result<Vec<Peer>, ApiError> {
        let resp: SearchResponse = self
            .send_json(self.request(Method::GET, "/users/search").query(&[("q", query)]))
            .await?;
        Ok(resp.users)
    }
}
