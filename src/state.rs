use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::config::{AppConfig, JwtConfig, RateLimitConfig};
use crate::ratelimit::RateLimiters;
use crate::store::{MemoryUserStore, PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub limiters: Arc<RateLimiters>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        // Bounded acquire timeout: a saturated pool surfaces an error
        // instead of hanging a request.
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        let limiters = Arc::new(RateLimiters::from_config(&config.rate_limit));
        Ok(Self {
            store: Arc::new(PgUserStore::new(pool)),
            config,
            limiters,
        })
    }

    /// Fully in-memory state for unit tests; touches no database.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: "postgres://unused".into(),
            jwt: JwtConfig {
                access_secret: "access-test-secret".into(),
                refresh_secret: "refresh-test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                access_ttl_minutes: 5,
                refresh_ttl_days: 7,
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                auth_max: 5,
                general_max: 100,
            },
        });
        let limiters = Arc::new(RateLimiters::from_config(&config.rate_limit));
        Self {
            store: Arc::new(MemoryUserStore::new()),
            config,
            limiters,
        }
    }
}
