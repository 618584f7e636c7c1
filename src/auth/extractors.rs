use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::error::AuthError;
use crate::auth::jwt::{extract_bearer, JwtKeys, TokenKind};
use crate::state::AppState;
use crate::store::User;

/// Request gate for protected routes: bearer token, access-domain verify,
/// then a store load so revoked or deactivated accounts are cut off even
/// while their tokens are still cryptographically valid. Read-only; no
/// store mutation on this path.
#[derive(Debug)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = extract_bearer(header).ok_or(AuthError::NoToken)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token, TokenKind::Access).map_err(|_| {
            warn!("invalid or expired access token");
            AuthError::InvalidToken
        })?;

        let user = state
            .store
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for missing or deactivated user");
                AuthError::InvalidToken
            })?;

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewUser, Role};

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/api/v1/auth/profile");
        if let Some(v) = value {
            builder = builder.header(axum::http::header::AUTHORIZATION, v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn seeded_state() -> (AppState, User) {
        let state = AppState::fake();
        let user = state
            .store
            .create(NewUser {
                username: "ada".into(),
                email: "ada@example.com".into(),
                password_hash: "$argon2id$fake".into(),
                role: Role::Traveller,
            })
            .await
            .unwrap();
        (state, user)
    }

    #[tokio::test]
    async fn missing_or_non_bearer_header_is_no_token() {
        let (state, _) = seeded_state().await;

        let mut parts = parts_with_auth(None);
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoToken));

        let mut parts = parts_with_auth(Some("Basic abc"));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoToken));
    }

    #[tokio::test]
    async fn valid_access_token_attaches_the_user() {
        let (state, user) = seeded_state().await;
        let token = JwtKeys::from_ref(&state).sign_access(&user).unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let CurrentUser(loaded) = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .expect("gate should pass");
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.username, "ada");
    }

    #[tokio::test]
    async fn refresh_token_is_rejected_on_the_access_path() {
        let (state, user) = seeded_state().await;
        let token = JwtKeys::from_ref(&state).sign_refresh(&user).unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn deactivation_cuts_off_a_still_valid_token() {
        let (state, user) = seeded_state().await;
        let token = JwtKeys::from_ref(&state).sign_access(&user).unwrap();
        state.store.set_active(user.id, false).await.unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
