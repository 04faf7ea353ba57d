//! Per-client rate limiting middleware.
//!
//! Each client IP gets its own token bucket holding at most `burst` tokens
//! and refilling at `requests_per_second`. A periodic sweep drops clients
//! that have been idle for longer than the configured TTL.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{rejection::ExtensionRejection, ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::LimiterConfig;
use crate::error::ApiError;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Shared limiter state, one bucket per client key.
#[derive(Debug)]
pub struct RateLimiter {
    clients: Mutex<HashMap<String, ClientEntry>>,
    enabled: bool,
    rate: f64,
    burst: f64,
    idle_ttl: Duration,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            enabled: config.enabled,
            rate: config.requests_per_second,
            burst: f64::from(config.burst),
            idle_ttl: config.idle_ttl(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Admit or reject one request from `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Like [`allow`](Self::allow) with an explicit clock reading.
    ///
    /// When disabled every request is admitted and no state is kept.
    /// A rejected request consumes nothing.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = self.lock();
        let entry = clients.entry(key.to_string()).or_insert_with(|| ClientEntry {
            bucket: TokenBucket::new(self.burst, now),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.bucket.try_acquire(self.burst, self.rate, now)
    }

    /// Drop clients idle for longer than the TTL. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.idle_ttl);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Run [`sweep`](Self::sweep) every `period` until shutdown starts.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = self.tracked_clients(), "Swept idle rate limit clients");
                        }
                    }
                    _ = shutdown.draining() => {
                        tracing::debug!("Rate limit sweeper stopping");
                        break;
                    }
                }
            }
        })
    }

    // The map is only mutated under short, non-panicking sections.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Middleware keyed on the peer IP address.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.enabled() {
        return next.run(request).await;
    }

    let ConnectInfo(addr) = match peer {
        Ok(peer) => peer,
        Err(e) => {
            return ApiError::Internal(format!("peer address unavailable for rate limiting: {e}"))
                .into_response()
        }
    };

    let key = addr.ip().to_string();
    if limiter.allow(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        ApiError::RateLimited.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(&LimiterConfig {
            enabled: true,
            requests_per_second: rps,
            burst,
            sweep_interval_secs: 60,
            idle_ttl_secs: 180,
        })
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = limiter(2.0, 4);
        let now = Instant::now();

        for i in 0..4 {
            assert!(limiter.allow_at("10.0.0.1", now), "request {i} should pass");
        }
        assert!(!limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now));
    }

    #[test]
    fn test_refills_at_rate() {
        let limiter = limiter(2.0, 4);
        let now = Instant::now();
        for _ in 0..4 {
            limiter.allow_at("10.0.0.1", now);
        }
        assert!(!limiter.allow_at("10.0.0.1", now));

        let later = now + Duration::from_millis(500);
        assert!(limiter.allow_at("10.0.0.1", later));
        assert!(!limiter.allow_at("10.0.0.1", later));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.2", now));
    }

    #[test]
    fn test_disabled_admits_everything() {
        let limiter = RateLimiter::new(&LimiterConfig {
            enabled: false,
            burst: 1,
            ..LimiterConfig::default()
        });
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.allow_at("10.0.0.1", now));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_sweep_evicts_idle_clients_only() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        limiter.allow_at("idle", start);
        limiter.allow_at("busy", start);
        limiter.allow_at("busy", start + Duration::from_secs(170));

        assert_eq!(limiter.sweep_at(start + Duration::from_secs(181)), 1);
        assert_eq!(limiter.tracked_clients(), 1);

        // An evicted client starts over with a full bucket.
        for _ in 0..4 {
            assert!(limiter.allow_at("idle", start + Duration::from_secs(182)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_shutdown() {
        let limiter = Arc::new(limiter(2.0, 4));
        let shutdown = Shutdown::new();
        limiter.allow("10.0.0.1");

        let handle = limiter
            .clone()
            .spawn_sweeper(Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.tracked_clients(), 1);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
