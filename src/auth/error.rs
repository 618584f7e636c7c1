use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::error;

use crate::response::ApiResponse;
use crate::store::StoreError;

/// Everything the auth surface can answer with. Each variant carries a
/// stable machine-readable code; messages stay deliberately vague on the
/// 401 paths so responses cannot be used to enumerate accounts.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username or email is already registered")]
    UserAlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is deactivated")]
    AccountDeactivated,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("missing bearer token")]
    NoToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("user not found")]
    UserNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("internal error")]
    Internal(anyhow::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UserAlreadyExists => "USER_ALREADY_EXISTS",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::NoToken => "NO_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::UserAlreadyExists | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::AccountDeactivated
            | AuthError::InvalidRefreshToken
            | AuthError::NoToken
            | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AuthError::UserAlreadyExists,
            StoreError::Backend(e) => AuthError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        // Full detail stays server-side; the client gets the category.
        if let AuthError::Internal(ref source) = self {
            error!(error = %source, "internal error on auth path");
        }
        let body = ApiResponse::err(self.to_string(), self.code());
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_are_stable() {
        assert_eq!(AuthError::UserAlreadyExists.code(), "USER_ALREADY_EXISTS");
        assert_eq!(AuthError::UserAlreadyExists.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_message_leaks_no_detail() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3:5432"));
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn duplicate_store_error_maps_to_user_already_exists() {
        let err: AuthError = StoreError::Duplicate.into();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }
}
