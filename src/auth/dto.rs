use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::store::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Access/refresh pair issued on login and refresh. Never persisted.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Public part of the user returned to the client. There is no hash field
/// here, so it cannot leak by serialization.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Response returned by the auth endpoints: `{user}` after register and
/// for `/me`, `{token}` after login and refresh. `user` serializes as
/// null when absent; `token` is omitted entirely.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: Option<PublicUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenPair>,
}

impl AuthResponse {
    pub fn with_user(user: PublicUser) -> Self {
        Self {
            user: Some(user),
            token: None,
        }
    }

    pub fn with_token(token: TokenPair) -> Self {
        Self {
            user: None,
            token: Some(token),
        }
    }
}
