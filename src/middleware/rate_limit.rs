use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;

use crate::config::RateLimitConfig;
use crate::response::AppError;
use crate::state::AppState;

/// The budget a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Budget {
    /// `POST /api/sessions` and the legacy `GET /createSession`.
    Allocation,
    General,
}

impl Budget {
    /// `None` for routes that are never limited.
    pub fn classify(method: &Method, path: &str) -> Option<Self> {
        if path == "/health" || path.starts_with("/health/") {
            return None;
        }
        match (method, path.trim_end_matches('/')) {
            (&Method::POST, "/api/sessions") | (&Method::GET, "/createSession") => {
                Some(Self::Allocation)
            }
            _ => Some(Self::General),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    hits: u64,
}

/// Outcome of charging one request, echoed back as `ratelimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_in: Duration,
}

/// Fixed-window request counter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    limit: u64,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, limit: u64) -> Self {
        Self {
            window,
            limit,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> Decision {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut clients = self.clients.lock().await;
        let window = clients.entry(ip).or_insert(Window {
            opened: now,
            hits: 0,
        });
        if now.saturating_duration_since(window.opened) >= self.window {
            *window = Window {
                opened: now,
                hits: 0,
            };
        }

        let allowed = window.hits < self.limit;
        if allowed {
            window.hits += 1;
        }

        Decision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(window.hits),
            reset_in: self
                .window
                .saturating_sub(now.saturating_duration_since(window.opened)),
        }
    }

    /// Forget clients whose window has lapsed; returns how many were dropped.
    pub async fn prune(&self) -> usize {
        self.prune_at(Instant::now()).await
    }

    async fn prune_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, w| now.saturating_duration_since(w.opened) < self.window);
        before - clients.len()
    }
}

/// Both budgets, shared across requests.
#[derive(Debug)]
pub struct RateLimits {
    window: Duration,
    general: RateLimiter,
    allocation: RateLimiter,
}

impl RateLimits {
    pub fn new(config: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_secs);
        Self {
            window,
            general: RateLimiter::new(window, config.max_requests),
            allocation: RateLimiter::new(window, config.max_allocations),
        }
    }

    pub fn limiter(&self, budget: Budget) -> &RateLimiter {
        match budget {
            Budget::Allocation => &self.allocation,
            Budget::General => &self.general,
        }
    }

    pub async fn prune(&self) -> usize {
        self.general.prune().await + self.allocation.prune().await
    }
}

pub async fn limit_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(budget) = Budget::classify(req.method(), req.uri().path()) else {
        return next.run(req).await;
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = client_ip(req.headers(), peer, state.config().trust_proxy);
    let decision = state.rate_limits().limiter(budget).check(ip).await;

    if !decision.allowed {
        tracing::warn!(client = %ip, budget = budget.as_str(), "Rate limit exceeded");
        let message = match budget {
            Budget::Allocation => "Too many sessions created, try again later",
            Budget::General => "Too many requests",
        };
        let mut response = AppError::too_many_requests(message).into_response();
        write_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(ceil_secs(decision.reset_in)));
        return response;
    }

    let mut response = next.run(req).await;
    write_headers(response.headers_mut(), &decision);
    response
}

fn write_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert("ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(ceil_secs(decision.reset_in)));
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Forwarding headers count only behind a trusted proxy; otherwise the socket peer wins.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> IpAddr {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    trust_proxy
        .then(|| header_ip("x-forwarded-for").or_else(|| header_ip("x-real-ip")))
        .flatten()
        .or(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn prune_loop(limits: Arc<RateLimits>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(limits.window.max(Duration::from_secs(60)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pruned = limits.prune().await;
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned idle rate limit windows");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
