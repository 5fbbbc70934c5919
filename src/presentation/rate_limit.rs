//! Per-client token buckets for the upload and summary endpoints.

use std::num::NonZeroU32;

use axum::http::HeaderMap;
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type KeyedLimiter = RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Two independent keyed buckets, one per guarded endpoint family.
pub struct ApiRateLimits {
    upload: KeyedLimiter,
    summary: KeyedLimiter,
}

impl ApiRateLimits {
    pub fn new(upload_per_minute: u32, summary_per_minute: u32) -> Self {
        Self {
            upload: RateLimiter::dashmap(per_minute(upload_per_minute)),
            summary: RateLimiter::dashmap(per_minute(summary_per_minute)),
        }
    }

    /// `Err(retry_after_secs)` when the bucket is exhausted.
    pub fn check_upload(&self, client_key: &str) -> Result<(), u64> {
        check(&self.upload, client_key)
    }

    pub fn check_summary(&self, client_key: &str) -> Result<(), u64> {
        check(&self.summary, client_key)
    }
}

fn per_minute(count: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(count.max(1)).unwrap_or(NonZeroU32::MIN))
}

fn check(limiter: &KeyedLimiter, client_key: &str) -> Result<(), u64> {
    match limiter.check_key(&client_key.to_string()) {
        Ok(_) => Ok(()),
        Err(not_until) => {
            let wait =
                not_until.wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
            Err(wait.as_secs() + 1)
        }
    }
}

/// Client identifier for rate limiting: the first `x-forwarded-for` hop when
/// present, otherwise a shared bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}
