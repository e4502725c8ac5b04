//! Per-host politeness delays for provider requests.
//!
//! Enforces a minimum delay between requests to the same provider host so
//! overlapping jobs stay inside upstream rate limits, and honors
//! server-mandated `Retry-After` pauses. Hosts are independent: requests to
//! different providers never wait on each other.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::MAX_RETRY_AFTER;

/// Per-host rate limiter shared by all workers.
///
/// Uses a concurrent map for lock-free host lookup; the per-host mutex is
/// held across the sleep so concurrent callers to the same host queue up
/// rather than stampede.
#[derive(Debug)]
pub struct HostRateLimiter {
    /// Minimum delay between requests to the same host.
    min_delay: Duration,
    /// Per-host state. Arc lets the map shard lock be released before
    /// awaiting on the inner mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Earliest instant the next request to this host may start.
    /// `None` means the host has not been requested yet.
    next_allowed: Mutex<Option<Instant>>,
}

impl HostRateLimiter {
    /// Creates a limiter with the given minimum inter-request delay.
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            hosts: DashMap::new(),
        }
    }

    /// Waits until a request to `host` is allowed, then reserves the next
    /// slot. The first request to any host proceeds immediately.
    #[instrument(skip(self))]
    pub async fn acquire(&self, host: &str) {
        let state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    next_allowed: Mutex::new(None),
                })
            })
            .clone();

        let mut next_allowed = state.next_allowed.lock().await;
        if let Some(at) = *next_allowed {
            let now = Instant::now();
            if at > now {
                let wait = at - now;
                debug!(host, wait_ms = wait.as_millis(), "applying politeness delay");
                tokio::time::sleep(wait).await;
            }
        }
        *next_allowed = Some(Instant::now() + self.min_delay);
    }

    /// Records a server-mandated pause (from a `Retry-After` header) so
    /// subsequent requests respect it. Delays are capped to avoid a
    /// misbehaving header stalling ingestion for hours.
    #[instrument(skip(self))]
    pub async fn record_retry_after(&self, host: &str, delay: Duration) {
        let capped = delay.min(MAX_RETRY_AFTER);
        if capped < delay {
            warn!(
                host,
                requested_secs = delay.as_secs(),
                capped_secs = capped.as_secs(),
                "Retry-After exceeded the cap; clamping"
            );
        }

        let state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    next_allowed: Mutex::new(None),
                })
            })
            .clone();

        let mut next_allowed = state.next_allowed.lock().await;
        let proposed = Instant::now() + capped;
        if next_allowed.is_none_or(|at| proposed > at) {
            *next_allowed = Some(proposed);
        }
        debug!(host, delay_secs = capped.as_secs(), "recorded server pause");
    }
}

/// Parses a `Retry-After` header value: either delta-seconds or an
/// RFC 7231 HTTP-date.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let when = httpdate::parse_http_date(trimmed).ok()?;
    when.duration_since(SystemTime::now()).ok()
}
