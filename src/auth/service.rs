use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::TokenPair;
use crate::auth::error::AuthError;
use crate::auth::jwt::{JwtKeys, TokenKind};
use crate::auth::password::{hash_password, verify_password};
use crate::store::{NewUser, Role, User, UserStore};

/// Session manager: owns the credential checks and the refresh-token
/// lifecycle. Handlers stay thin on top of this.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    fn mint_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let access_token = self.keys.sign_access(user).map_err(AuthError::Internal)?;
        let refresh_token = self.keys.sign_refresh(user).map_err(AuthError::Internal)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<(User, TokenPair), AuthError> {
        let email = email.trim().to_lowercase();

        // Pre-check both fields for a precise rejection; the store's unique
        // constraints still catch the create/create race.
        if self.store.find_by_identifier(username).await?.is_some()
            || self.store.find_by_identifier(&email).await?.is_some()
        {
            warn!(username, "signup collision");
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = hash_password(password).map_err(AuthError::Internal)?;
        let user = self
            .store
            .create(NewUser {
                username: username.to_string(),
                email,
                password_hash,
                role,
            })
            .await?;

        let pair = self.mint_pair(&user)?;
        self.store
            .push_refresh_token(user.id, &pair.refresh_token)
            .await?;

        info!(user_id = %user.id, username = %user.username, "user signed up");
        Ok((user, pair))
    }

    /// Missing user and wrong password collapse to the same error so the
    /// response cannot be used to probe which accounts exist. Check order:
    /// existence, active flag, password.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        let user = self
            .store
            .find_by_identifier(identifier.trim())
            .await?
            .ok_or_else(|| {
                warn!("login with unknown identifier");
                AuthError::InvalidCredentials
            })?;

        if !user.is_active {
            warn!(user_id = %user.id, "login on deactivated account");
            return Err(AuthError::AccountDeactivated);
        }

        let ok = verify_password(password, &user.password_hash).map_err(AuthError::Internal)?;
        if !ok {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.mint_pair(&user)?;
        self.store
            .push_refresh_token(user.id, &pair.refresh_token)
            .await?;

        info!(user_id = %user.id, "user logged in");
        Ok((user, pair))
    }

    /// Rotation-on-use: the presented token leaves the store the moment it
    /// is redeemed, so a stolen-but-unused refresh token is good for at most
    /// one replay. Validity is signature AND store membership.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), AuthError> {
        let claims = self
            .keys
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !user.is_active {
            warn!(user_id = %user.id, "refresh on deactivated account");
            return Err(AuthError::AccountDeactivated);
        }

        let pair = self.mint_pair(&user)?;
        let rotated = self
            .store
            .rotate_refresh_token(user.id, refresh_token, &pair.refresh_token)
            .await?;
        if !rotated {
            // Already rotated out, evicted by the bound, or never stored.
            warn!(user_id = %user.id, "refresh with revoked token");
            return Err(AuthError::InvalidRefreshToken);
        }

        info!(user_id = %user.id, "refresh token rotated");
        Ok((user, pair))
    }

    /// Idempotent once the caller's identity is established; removing an
    /// absent token is a no-op.
    pub async fn logout(
        &self,
        user_id: Uuid,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(token) = refresh_token {
            self.store.remove_refresh_token(user_id, token).await?;
        }
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}
