use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::state::AppState;
use crate::store::{Role, User};

/// Signing domain: access and refresh tokens are signed under distinct
/// secrets, so one can never be replayed as the other.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Unique per issued token, so two tokens minted in the same second for
    /// the same user are still distinct strings in the store.
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

#[derive(Clone)]
struct DomainKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl DomainKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct JwtKeys {
    access: DomainKeys,
    refresh: DomainKeys,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access: DomainKeys::from_secret(&cfg.access_secret),
            refresh: DomainKeys::from_secret(&cfg.refresh_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_days as u64) * 24 * 3600),
        }
    }

    fn domain(&self, kind: TokenKind) -> &DomainKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(&self, user: &User, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.domain(kind).encoding)?;
        debug!(user_id = %user.id, kind = ?kind, "token signed");
        Ok(token)
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        self.sign_with_kind(user, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user: &User) -> anyhow::Result<String> {
        self.sign_with_kind(user, TokenKind::Refresh)
    }

    /// Pure cryptographic check: signature under the domain's secret,
    /// expiry, issuer/audience, and the embedded kind. Revocation is the
    /// session layer's business.
    pub fn verify(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.domain(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            anyhow::bail!("token kind mismatch");
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "token verified");
        Ok(data.claims)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
/// A missing or non-bearer scheme is `None`, not an error; the caller
/// decides whether that is fatal.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let header = header?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::store::{Role, TokenRing};

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-test-secret".into(),
            refresh_secret: "refresh-test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 5,
            refresh_ttl_days: 7,
        }
    }

    fn test_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$fake".into(),
            role: Role::Traveller,
            is_active: true,
            refresh_tokens: TokenRing::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = JwtKeys::from_config(&test_config());
        let user = test_user();
        let token = keys.sign_access(&user).expect("sign access");
        let claims = keys.verify(&token, TokenKind::Access).expect("verify");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "ada");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, Role::Traveller);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn sign_and_verify_refresh_token() {
        let keys = JwtKeys::from_config(&test_config());
        let user = test_user();
        let token = keys.sign_refresh(&user).expect("sign refresh");
        let claims = keys.verify(&token, TokenKind::Refresh).expect("verify");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn domains_do_not_cross_verify() {
        let keys = JwtKeys::from_config(&test_config());
        let user = test_user();

        let access = keys.sign_access(&user).expect("sign access");
        assert!(keys.verify(&access, TokenKind::Refresh).is_err());

        let refresh = keys.sign_refresh(&user).expect("sign refresh");
        assert!(keys.verify(&refresh, TokenKind::Access).is_err());
    }

    #[test]
    fn verify_rejects_garbage_and_wrong_secret() {
        let keys = JwtKeys::from_config(&test_config());
        assert!(keys.verify("not.a.jwt", TokenKind::Access).is_err());

        let mut other_cfg = test_config();
        other_cfg.access_secret = "a-different-secret".into();
        let other = JwtKeys::from_config(&other_cfg);
        let token = other.sign_access(&test_user()).expect("sign");
        assert!(keys.verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn extract_bearer_handles_scheme_variants() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("Basic abc")), None);
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(None), None);
    }
}
