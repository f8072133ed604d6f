//! Per-IP request throttling backed by governor.

use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};

use crate::{config::RateLimitSettings, error::AppError};

pub struct IpRateLimiter {
    name: &'static str,
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
    message: &'static str,
    trust_proxy: bool,
}

impl IpRateLimiter {
    /// Allows `max_requests` at once per client, then one more per full
    /// `window`, so no window ever admits more than `max_requests + 1`.
    pub fn new(name: &'static str, max_requests: u32, window: Duration, message: &'static str) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            name,
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
            message,
            trust_proxy: false,
        }
    }

    /// Key clients by `x-forwarded-for` / `x-real-ip`. Only safe behind a
    /// proxy that overwrites those headers.
    pub fn trusting_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Seconds to wait when `key` is over its quota.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.limiter.check_key(&key.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
        })
    }

    /// Forgets clients whose quota has fully refilled; returns how many are left.
    pub fn prune(&self) -> usize {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        self.limiter.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

impl std::fmt::Debug for IpRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpRateLimiter").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub api: Arc<IpRateLimiter>,
    pub login: Arc<IpRateLimiter>,
    pub public_leads: Arc<IpRateLimiter>,
    pub public_proposals: Arc<IpRateLimiter>,
}

impl RateLimiters {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let window = Duration::from_secs(settings.window_seconds);
        let build = |name: &'static str, max: u32, message: &'static str| {
            Arc::new(IpRateLimiter::new(name, max, window, message).trusting_proxy(settings.trust_proxy))
        };
        Self {
            api: build(
                "api",
                settings.api,
                "Too many requests from this IP, please try again later.",
            ),
            login: build(
                "login",
                settings.login,
                "Too many login attempts from this IP. Please try again after 15 minutes.",
            ),
            public_leads: build(
                "public_leads",
                settings.public_leads,
                "Too many submissions from this IP. Please try again after 15 minutes.",
            ),
            public_proposals: build(
                "public_proposals",
                settings.public_proposals,
                "Too many requests. Please try again later.",
            ),
        }
    }

    pub fn prune(&self) {
        for limiter in [&self.api, &self.login, &self.public_leads, &self.public_proposals] {
            let remaining = limiter.prune();
            tracing::debug!(limiter = limiter.name, remaining, "pruned rate limiter state");
        }
    }
}

/// Periodically drops idle client entries so spoofed or one-off addresses
/// do not accumulate.
pub fn spawn_pruner(limiters: RateLimiters, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            limiters.prune();
        }
    })
}

/// The socket peer, or with `trust_proxy` the first hop of
/// `x-forwarded-for`, then `x-real-ip`, then the socket peer.
pub fn client_ip(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = forwarded_ip(req) {
            return forwarded;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(forwarded.to_string());
    }

    if let Some(real_ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(real_ip.to_string());
    }

    None
}

pub async fn enforce(
    State(limiter): State<Arc<IpRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req, limiter.trust_proxy);
    match limiter.check(&ip) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::warn!(
                limiter = limiter.name,
                client_ip = %ip,
                path = %req.uri().path(),
                retry_after,
                "rate limit exceeded"
            );
            AppError::too_many_requests(limiter.message, retry_after.max(1)).into_response()
        }
    }
}
