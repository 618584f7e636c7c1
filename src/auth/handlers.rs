use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::auth::{
    dto::{LoginRequest, LogoutRequest, PublicUser, RefreshRequest, SessionData, SignupRequest},
    error::AuthError,
    extractors::CurrentUser,
    jwt::JwtKeys,
    service::AuthService,
};
use crate::response::ApiResponse;
use crate::state::AppState;

/// Unauthenticated endpoints; sit behind the tight rate-limit tier.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// Bearer-token endpoints; sit behind the general rate-limit tier.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/profile", get(profile))
}

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{3,30}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn validate_signup(payload: &SignupRequest) -> Result<(), AuthError> {
    if !USERNAME_RE.is_match(&payload.username) {
        return Err(AuthError::Validation(
            "username must be 3-30 characters of letters, digits or underscore".into(),
        ));
    }
    if !is_valid_email(payload.email.trim()) {
        return Err(AuthError::Validation("email is not a valid address".into()));
    }
    if payload.password.len() < 8 {
        return Err(AuthError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

fn service(state: &AppState) -> AuthService {
    AuthService::new(state.store.clone(), JwtKeys::from_ref(state))
}

type SessionReply = (StatusCode, Json<ApiResponse<SessionData>>);

#[instrument(skip(state, payload))]
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<SessionReply, AuthError> {
    validate_signup(&payload).map_err(|e| {
        warn!(username = %payload.username, "signup validation failed");
        e
    })?;

    let (user, tokens) = service(&state)
        .signup(
            payload.username.trim(),
            &payload.email,
            &payload.password,
            payload.role,
        )
        .await?;

    let data = SessionData {
        user: PublicUser::from(&user),
        tokens,
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("account created", data)),
    ))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<SessionReply, AuthError> {
    let (user, tokens) = service(&state)
        .login(&payload.identifier, &payload.password)
        .await?;

    let data = SessionData {
        user: PublicUser::from(&user),
        tokens,
    };
    Ok((StatusCode::OK, Json(ApiResponse::ok("logged in", data))))
}

#[instrument(skip(state, payload))]
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<SessionReply, AuthError> {
    let (user, tokens) = service(&state).refresh(&payload.refresh_token).await?;

    let data = SessionData {
        user: PublicUser::from(&user),
        tokens,
    };
    Ok((StatusCode::OK, Json(ApiResponse::ok("session refreshed", data))))
}

#[instrument(skip_all)]
async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Option<Json<LogoutRequest>>,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    let refresh_token = payload.and_then(|Json(p)| p.refresh_token);
    service(&state)
        .logout(user.id, refresh_token.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok_empty("logged out")))
}

#[instrument(skip_all)]
async fn profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<PublicUser>>, AuthError> {
    // Precedence: a user already missing when the gate loads it is a 401
    // from the gate. The re-resolve here covers only a delete racing in
    // between, which is the one case that reports 404 USER_NOT_FOUND.
    let user = service(&state).profile(user.id).await?;
    Ok(Json(ApiResponse::ok("profile", PublicUser::from(&user))))
}

pub async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::ok_empty("ok"))
}
