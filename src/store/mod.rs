use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub mod memory;
pub mod pg;

pub use memory::MemoryUserStore;
pub use pg::PgUserStore;

/// How many refresh tokens a user may hold at once. Oldest is evicted first.
pub const MAX_REFRESH_TOKENS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Traveller,
    Guide,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Traveller => "traveller",
            Role::Guide => "guide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "traveller" => Some(Role::Traveller),
            "guide" => Some(Role::Guide),
            _ => None,
        }
    }
}

/// Fixed-capacity FIFO of valid refresh token strings.
///
/// Push appends at the back; when the bound is exceeded the front (oldest)
/// entry is dropped, regardless of whether it is still within its
/// cryptographic expiry window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRing {
    tokens: Vec<String>,
}

impl TokenRing {
    pub fn from_parts(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn push(&mut self, token: String) {
        self.tokens.push(token);
        if self.tokens.len() > MAX_REFRESH_TOKENS {
            let excess = self.tokens.len() - MAX_REFRESH_TOKENS;
            self.tokens.drain(..excess);
        }
    }

    /// Removes `token` if present. Returns whether anything was removed.
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t != token);
        self.tokens.len() != before
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    pub fn into_vec(self) -> Vec<String> {
        self.tokens
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub refresh_tokens: TokenRing,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields the caller supplies at creation; everything else is store-assigned.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username or email already taken")]
    Duplicate,
    #[error("store backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Persistence boundary for user records and their refresh-token rings.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Matches username exactly or email case-insensitively.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    /// Appends a refresh token, evicting the oldest past the bound.
    async fn push_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;

    /// Atomically replaces `old` with `new` in the user's ring.
    ///
    /// Returns `false` without mutating anything when `old` is not present,
    /// so concurrent redemptions of the same token have at most one winner.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: &str,
    ) -> Result<bool, StoreError>;

    /// Removes a refresh token. Removing an absent token is a no-op.
    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;
}
