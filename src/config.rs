use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    /// Per-window budget for signup/login/refresh.
    pub auth_max: u32,
    /// Per-window budget for everything else.
    pub general_max: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            access_secret: std::env::var("ACCESS_TOKEN_SECRET")?,
            refresh_secret: std::env::var("REFRESH_TOKEN_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "wayfarer".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "wayfarer-app".into()),
            access_ttl_minutes: env_parse("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS", 7),
        };
        let rate_limit = RateLimitConfig {
            window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", 15 * 60),
            auth_max: env_parse("RATE_LIMIT_AUTH_MAX", 5),
            general_max: env_parse("RATE_LIMIT_GENERAL_MAX", 100),
        };
        Ok(Self {
            database_url,
            jwt,
            rate_limit,
        })
    }
}
