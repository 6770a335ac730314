//! Rate Limiting Infrastructure
//!
//! Fixed-window rate limiting keyed by an arbitrary string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_in: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit backend unavailable: {0}")]
    Backend(String),
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Check and increment rate limit counter
    ///
    /// Rejected requests do not extend or reset the window.
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    length: Duration,
    count: u32,
}

impl Window {
    fn elapsed_at(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

#[derive(Debug, Default)]
struct Windows {
    by_key: HashMap<String, Window>,
    swept_at: Option<Instant>,
}

impl Windows {
    /// Drop fully elapsed windows, at most once per `interval`
    fn sweep(&mut self, now: Instant, interval: Duration) {
        if self
            .swept_at
            .is_some_and(|at| now.duration_since(at) < interval)
        {
            return;
        }
        self.by_key.retain(|_, w| !w.elapsed_at(now));
        self.swept_at = Some(now);
    }
}

/// Process-local rate limit store.
///
/// Suitable for a single API instance; counters are lost on restart.
/// Elapsed windows are evicted as requests arrive, so memory stays
/// bounded by the keys seen within one window.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimitStore {
    windows: Arc<Mutex<Windows>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.sweep(now, config.window);

        let fresh = Window {
            started: now,
            length: config.window,
            count: 0,
        };
        let entry = windows.by_key.entry(key.to_string()).or_insert(fresh);
        if entry.elapsed_at(now) {
            *entry = fresh;
        }

        let reset_in = config
            .window
            .saturating_sub(now.duration_since(entry.started));

        if entry.count >= config.max_requests {
            return Ok(RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_in,
            });
        }

        entry.count += 1;

        Ok(RateLimitResult {
            allowed: true,
            remaining: config.max_requests - entry.count,
            reset_in,
        })
    }
}
