//! Request and response bodies of the REST collaborator.

use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message, Peer};
use crate::types::PeerId;

/// `GET /messages`
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsResponse {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

/// `GET /messages/{peer}`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// `GET /users/search?q=`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub users: Vec<Peer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// The authenticated user as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: PeerId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// `POST /auth/login` and `POST /auth/register`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserRecord,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_shape() {
        let json = r#"{
            "user": { "id": 1, "username": "me", "email": "me@x.io" },
            "accessToken": "tok",
            "refreshToken": "ref"
        }"#;
        let r: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(r.user.id, PeerId::from(1u64));
        assert_eq!(r.access_token, "tok");
        assert_eq!(r.refresh_token.as_deref(), Some("ref"));
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let r: ConversationsResponse = serde_json::from_str("{}").unwrap();
        assert!(r.conversations.is_empty());
        let r: SearchResponse = serde_json::from_str(r#"{"users":[{"id":3,"username":"cy"}]}"#).unwrap();
        assert_eq!(r.users[0].display_name, "cy");
    }
}
