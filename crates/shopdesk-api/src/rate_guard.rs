//! Per-tenant admission guard.
//!
//! Fixed-window counters keyed by tenant. Windows are aligned to multiples
//! of the window length since the Unix epoch, so every replica agrees on
//! when a window resets. Check and increment happen under one lock.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use shopdesk_core::TenantId;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::task::JoinHandle;

use crate::error::ApiError;

/// Default requests per tenant per window.
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 600;

/// Default window length in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Seconds until the current window resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Request budget of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateQuota {
    #[must_use]
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs: window_secs.max(1),
        }
    }

    fn window_start(&self, now_secs: u64) -> u64 {
        now_secs - now_secs % self.window_secs
    }
}

impl Default for RateQuota {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS)
    }
}

/// Configuration for the rate guard.
#[derive(Debug, Clone, Default)]
pub struct RateGuardConfig {
    /// Budget of tenants without an override.
    pub default_quota: RateQuota,
    /// Per-tenant budgets.
    pub overrides: HashMap<TenantId, RateQuota>,
}

impl RateGuardConfig {
    #[must_use]
    pub fn new(default_quota: RateQuota) -> Self {
        Self {
            default_quota,
            overrides: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_override(mut self, tenant_id: TenantId, quota: RateQuota) -> Self {
        self.overrides.insert(tenant_id, quota);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct RateBucket {
    window_start: u64,
    window_secs: u64,
    count: u32,
}

/// An admitted request's position in its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset_after: u64,
}

impl Allowance {
    /// Add the `X-RateLimit-*` headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(self.reset_after));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted(Allowance),
    /// Over budget; `retry_after` is at least one second.
    Limited { limit: u32, retry_after: u64 },
}

/// In-memory fixed-window rate guard, shared by clone.
#[derive(Debug, Clone, Default)]
pub struct RateGuard {
    config: Arc<RateGuardConfig>,
    buckets: Arc<Mutex<HashMap<TenantId, RateBucket>>>,
}

impl RateGuard {
    #[must_use]
    pub fn new(config: RateGuardConfig) -> Self {
        Self {
            config: Arc::new(config),
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateGuardConfig {
        &self.config
    }

    #[must_use]
    pub fn quota_for(&self, tenant_id: TenantId) -> RateQuota {
        self.config
            .overrides
            .get(&tenant_id)
            .copied()
            .unwrap_or(self.config.default_quota)
    }

    /// Count a request of `tenant_id` against its budget.
    pub fn admit(&self, tenant_id: TenantId) -> RateDecision {
        self.admit_at(tenant_id, unix_now())
    }

    /// [`admit`](Self::admit) at an explicit clock reading.
    pub fn admit_at(&self, tenant_id: TenantId, now_secs: u64) -> RateDecision {
        let quota = self.quota_for(tenant_id);
        let window_start = quota.window_start(now_secs);
        let reset_after = (window_start + quota.window_secs - now_secs).max(1);

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(tenant_id).or_insert(RateBucket {
            window_start,
            window_secs: quota.window_secs,
            count: 0,
        });

        if bucket.window_start != window_start || bucket.window_secs != quota.window_secs {
            *bucket = RateBucket {
                window_start,
                window_secs: quota.window_secs,
                count: 0,
            };
        }

        if bucket.count >= quota.max_requests {
            return RateDecision::Limited {
                limit: quota.max_requests,
                retry_after: reset_after,
            };
        }

        bucket.count += 1;
        RateDecision::Admitted(Allowance {
            limit: quota.max_requests,
            remaining: quota.max_requests - bucket.count,
            reset_after,
        })
    }

    /// Drop buckets whose window has ended.
    pub fn cleanup(&self) {
        self.cleanup_at(unix_now());
    }

    pub fn cleanup_at(&self, now_secs: u64) {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, b| b.window_start + b.window_secs > now_secs);
        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!(removed, "Rate buckets cleaned up");
        }
    }

    /// Number of tracked tenants.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.buckets.lock().len()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Axum middleware applying the guard to tenant-scoped requests.
///
/// Must run inside the tenant layer. Requests without a resolved tenant
/// are not counted.
pub async fn rate_guard_middleware(
    State(guard): State<RateGuard>,
    request: Request,
    next: Next,
) -> Response {
    let Some(tenant_id) = request.extensions().get::<TenantId>().copied() else {
        return next.run(request).await;
    };

    match guard.admit(tenant_id) {
        RateDecision::Admitted(allowance) => {
            let mut response = next.run(request).await;
            allowance.apply(response.headers_mut());
            response
        }
        RateDecision::Limited { limit, retry_after } => {
            tracing::warn!(
                target: "security",
                tenant_id = %tenant_id,
                limit,
                retry_after,
                "Tenant rate limit exceeded"
            );
            let mut response = ApiError::RateLimited { retry_after }.into_response();
            Allowance {
                limit,
                remaining: 0,
                reset_after: retry_after,
            }
            .apply(response.headers_mut());
            response
        }
    }
}

/// Run [`RateGuard::cleanup`] every `interval`.
pub fn spawn_rate_guard_cleanup(guard: RateGuard, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            guard.cleanup();
        }
    })
}
