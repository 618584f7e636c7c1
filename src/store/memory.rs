use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewUser, StoreError, TokenRing, User, UserStore};

/// In-memory store used by tests and local development. All ring mutations
/// happen under a single write lock, which gives the same at-most-one-winner
/// rotation semantics as the row lock in the Postgres store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let email = new.email.to_lowercase();
        let taken = users
            .values()
            .any(|u| u.username == new.username || u.email == email);
        if taken {
            return Err(StoreError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email,
            password_hash: new.password_hash,
            role: new.role,
            is_active: true,
            refresh_tokens: TokenRing::default(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let lowered = identifier.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == identifier || u.email == lowered)
            .cloned())
    }

    async fn push_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.refresh_tokens.push(token.to_string());
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        if !user.refresh_tokens.remove(old) {
            return Ok(false);
        }
        user.refresh_tokens.push(new.to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            if user.refresh_tokens.remove(token) {
                user.updated_at = OffsetDateTime::now_utc();
            }
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.is_active = active;
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}
