use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{Role, User};

/// Request body for sign-up.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Request body for login; `identifier` is a username or an email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// What the client may see of a user. Never hash or token material.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// `data` payload for signup/login/refresh.
#[derive(Debug, Serialize)]
pub struct SessionData {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TokenRing;

    #[test]
    fn public_user_exposes_no_secret_material() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$super-secret".into(),
            role: Role::Guide,
            is_active: true,
            refresh_tokens: TokenRing::from_parts(vec!["tok-1".into()]),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("ada@example.com"));
        assert!(json.contains("guide"));
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("tok-1"));
    }
}
