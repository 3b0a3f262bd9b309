//! Per-actor token bucket for mutating requests.

use std::collections::HashMap;
use std::time::Instant;

use campus_core::error::CoreError;
use campus_core::types::DbId;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(DbId, DbId), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `(tenant, user)` or fail with the wait until the
    /// next token.
    pub async fn check(&self, tenant_id: DbId, user_id: DbId) -> Result<(), CoreError> {
        self.check_at(tenant_id, user_id, Instant::now()).await
    }

    async fn check_at(&self, tenant_id: DbId, user_id: DbId, now: Instant) -> Result<(), CoreError> {
        let cfg = &self.config;
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry((tenant_id, user_id)).or_insert_with(|| Bucket {
            tokens: cfg.capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * cfg.refill_per_sec).min(cfg.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        let wait = ((1.0 - bucket.tokens) / cfg.refill_per_sec).ceil().max(1.0);
        tracing::debug!(%tenant_id, %user_id, retry_after_secs = wait, "Rate limit exceeded");
        Err(CoreError::RateLimited {
            retry_after_secs: wait as u64,
        })
    }
}
