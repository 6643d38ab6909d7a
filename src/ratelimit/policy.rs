//! Rate limit scopes and their compiled-in policies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// An independent rate-limiting namespace.
///
/// Budgets never leak between scopes: the same caller IP has one counter
/// for webhook calls and a separate one for authentication attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Inbound webhook deliveries, keyed by caller IP
    WebhookByIp,
    /// State-changing requests to the authentication surface, keyed by caller IP
    AuthAttemptByIp,
    /// Everything else, keyed by principal (or `ip:<addr>` fallback)
    ApiByIdentity,
}

impl Scope {
    /// All scopes, in selection order.
    pub const ALL: [Scope; 3] = [Scope::WebhookByIp, Scope::AuthAttemptByIp, Scope::ApiByIdentity];

    /// Stable name used in bucket keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::WebhookByIp => "webhook-by-ip",
            Scope::AuthAttemptByIp => "auth-attempt-by-ip",
            Scope::ApiByIdentity => "api-by-identity",
        }
    }

    /// Compiled-in policy for this scope: (limit, window).
    pub fn default_limits(&self) -> (u64, Duration) {
        match self {
            Scope::WebhookByIp => (100, Duration::from_secs(60)),
            Scope::AuthAttemptByIp => (5, Duration::from_secs(60)),
            Scope::ApiByIdentity => (60, Duration::from_secs(60)),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable limit and window for one scope.
///
/// Only constructible through [`RateLimitPolicy::new`], which refuses
/// policies that could never admit a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u64,
    window: Duration,
}

impl RateLimitPolicy {
    pub fn new(scope: Scope, limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(TurnstileError::InvalidPolicy {
                scope: scope.as_str(),
                reason: "limit must be greater than zero".to_string(),
            });
        }
        if window.is_zero() {
            return Err(TurnstileError::InvalidPolicy {
                scope: scope.as_str(),
                reason: "window must be longer than zero".to_string(),
            });
        }
        Ok(Self { limit, window })
    }

    /// Maximum admitted requests per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// What the store keeps once a bucket is past its limit.
///
/// Admission, `remaining` and `retry_after` are the same under both
/// policies; only the stored count differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Keep counting every observed request (load telemetry)
    #[default]
    Accumulate,
    /// Stop counting at `limit + 1`
    Saturate,
}

/// Validated policies for every scope.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    webhook: RateLimitPolicy,
    auth_attempt: RateLimitPolicy,
    api: RateLimitPolicy,
}

impl PolicyTable {
    /// Build a table from explicit policies.
    pub fn new(
        webhook: RateLimitPolicy,
        auth_attempt: RateLimitPolicy,
        api: RateLimitPolicy,
    ) -> Self {
        Self {
            webhook,
            auth_attempt,
            api,
        }
    }

    /// The compiled-in policies, validated.
    ///
    /// Called once at startup so that a bad constant stops the process
    /// before any request is served.
    pub fn compiled() -> Result<Self> {
        let policy = |scope: Scope| {
            let (limit, window) = scope.default_limits();
            RateLimitPolicy::new(scope, limit, window)
        };
        Ok(Self::new(
            policy(Scope::WebhookByIp)?,
            policy(Scope::AuthAttemptByIp)?,
            policy(Scope::ApiByIdentity)?,
        ))
    }

    pub fn get(&self, scope: Scope) -> &RateLimitPolicy {
        match scope {
            Scope::WebhookByIp => &self.webhook,
            Scope::AuthAttemptByIp => &self.auth_attempt,
            Scope::ApiByIdentity => &self.api,
        }
    }
}
