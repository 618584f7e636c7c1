use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Outcome of counting one request against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window resets, rounded up.
    pub reset_secs: u64,
}

/// Fixed-window counter per client address. The window resets on a timer
/// from its first request, not a sliding horizon; counts live in process
/// memory and are injected through `AppState` rather than held globally.
pub struct FixedWindowLimiter {
    counters: DashMap<IpAddr, (Instant, u32)>,
    max: u32,
    window: Duration,
    last_sweep: std::sync::Mutex<Instant>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            max,
            window,
            last_sweep: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Drops every entry whose window has lapsed. Runs at most once per
    /// window so the map stays bounded by the set of clients active within
    /// it, not by every address ever seen.
    fn sweep(&self, now: Instant) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);
        self.counters
            .retain(|_, (start, _)| now.duration_since(*start) < self.window);
    }

    pub fn hit(&self, key: IpAddr) -> Decision {
        let now = Instant::now();
        self.sweep(now);
        let mut entry = self.counters.entry(key).or_insert((now, 0));
        let (start, count) = &mut *entry;
        if now.duration_since(*start) >= self.window {
            *start = now;
            *count = 0;
        }
        *count += 1;
        let elapsed = now.duration_since(*start);
        let reset = self.window.saturating_sub(elapsed);
        Decision {
            allowed: *count <= self.max,
            limit: self.max,
            remaining: self.max.saturating_sub(*count),
            reset_secs: reset.as_secs() + u64::from(reset.subsec_nanos() > 0),
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.counters.len()
    }
}

/// The two tiers the router composes: a tight budget in front of the
/// credential endpoints, a loose one everywhere else.
pub struct RateLimiters {
    pub auth: FixedWindowLimiter,
    pub general: FixedWindowLimiter,
}

impl RateLimiters {
    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(cfg.window_secs);
        Self {
            auth: FixedWindowLimiter::new(cfg.auth_max, window),
            general: FixedWindowLimiter::new(cfg.general_max, window),
        }
    }
}

fn set_headers(response: &mut Response, decision: Decision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_secs));
}

async fn enforce(
    tier: &FixedWindowLimiter,
    addr: SocketAddr,
    req: Request,
    next: Next,
) -> Response {
    let decision = tier.hit(addr.ip());
    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        warn!(client = %addr.ip(), "rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::err(
                "too many requests, try again later",
                "RATE_LIMIT_EXCEEDED",
            )),
        )
            .into_response()
    };
    set_headers(&mut response, decision);
    response
}

pub async fn auth_tier(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    enforce(&state.limiters.auth, addr, req, next).await
}

pub async fn general_tier(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    enforce(&state.limiters.general, addr, req, next).await
}
