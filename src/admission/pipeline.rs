//! The admission pipeline.
//!
//! Each request runs through one pass:
//!
//! 1. Public paths are forwarded without further checks.
//! 2. Webhook ingestion is limited per caller IP (`webhook-by-ip`).
//! 3. State-changing calls to the authentication surface are limited per
//!    caller IP (`auth-attempt-by-ip`).
//! 4. Everything else needs a principal. Without one the request is
//!    unauthorized and no budget is consumed; with one it is limited per
//!    principal (`api-by-identity`).

use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::classifier::{classify, has_segment_prefix, normalize_path, PathClass};
use super::client_ip::client_ip;
use super::identity::{IdentityResolver, Principal};
use super::outcome::AdmissionOutcome;
use super::RequestInfo;
use crate::clock::Clock;
use crate::ratelimit::{BucketKey, PolicyTable, RateLimiter, Scope};

/// Webhook ingestion surface.
const WEBHOOK_PREFIX: &str = "/api/webhooks";
/// Authentication surface.
const AUTH_PREFIX: &str = "/api/auth";

/// Default upper bound on one identity lookup.
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(2);

/// Orchestrates classification, identity resolution and rate limiting.
pub struct AdmissionPipeline {
    limiter: RateLimiter,
    policies: PolicyTable,
    resolver: Arc<dyn IdentityResolver>,
    clock: Arc<dyn Clock>,
    resolver_timeout: Duration,
}

impl AdmissionPipeline {
    pub fn new(
        limiter: RateLimiter,
        policies: PolicyTable,
        resolver: Arc<dyn IdentityResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            policies,
            resolver,
            clock,
            resolver_timeout: DEFAULT_RESOLVER_TIMEOUT,
        }
    }

    /// Bound identity lookups; a lookup that times out counts as no principal.
    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Decide what happens to one request.
    pub async fn evaluate(&self, request: &RequestInfo<'_>) -> AdmissionOutcome {
        if classify(request.path) == PathClass::Public {
            return AdmissionOutcome::Forward;
        }

        let path = normalize_path(request.path);
        let ip = client_ip(request.headers);

        let key = if has_segment_prefix(&path, WEBHOOK_PREFIX) {
            BucketKey::new(Scope::WebhookByIp, ip)
        } else if has_segment_prefix(&path, AUTH_PREFIX) && is_state_changing(request.method) {
            BucketKey::new(Scope::AuthAttemptByIp, ip)
        } else {
            match self.resolve_principal(request).await {
                Some(principal) => BucketKey::for_principal(principal.id(), &ip),
                None => {
                    info!(path = %path, ip = %ip, "Rejected request without principal");
                    return AdmissionOutcome::Unauthorized;
                }
            }
        };

        let policy = self.policies.get(key.scope);
        let decision = self.limiter.check_and_consume(&key, policy, self.clock.now());

        if decision.admitted {
            debug!(key = %key, remaining = decision.remaining, "Request admitted");
            AdmissionOutcome::Forward
        } else {
            warn!(
                key = %key,
                path = %path,
                limit = decision.limit,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
            AdmissionOutcome::RateLimited {
                limit: policy.limit(),
                remaining: decision.remaining,
                retry_after_secs: decision.retry_after_secs,
            }
        }
    }

    /// Ask the resolver for a principal. Errors and timeouts fail closed.
    async fn resolve_principal(&self, request: &RequestInfo<'_>) -> Option<Principal> {
        match tokio::time::timeout(self.resolver_timeout, self.resolver.resolve(request)).await {
            Ok(Ok(principal)) => principal,
            Ok(Err(e)) => {
                warn!(error = %e, "Identity resolution failed, treating caller as anonymous");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.resolver_timeout.as_millis() as u64,
                    "Identity resolution timed out, treating caller as anonymous"
                );
                None
            }
        }
    }
}

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::{Result, TurnstileError};
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Resolver with a fixed answer that counts how often it is asked.
    struct StaticResolver {
        principal: Option<Principal>,
        calls: AtomicUsize,
    }

    impl StaticResolver {
        fn new(principal: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                principal: principal.map(Principal::new),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IdentityResolver for StaticResolver {
        async fn resolve(&self, _request: &RequestInfo<'_>) -> Result<Option<Principal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.principal.clone())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl IdentityResolver for FailingResolver {
        async fn resolve(&self, _request: &RequestInfo<'_>) -> Result<Option<Principal>> {
            Err(TurnstileError::Identity("session store unreachable".to_string()))
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl IdentityResolver for SlowResolver {
        async fn resolve(&self, _request: &RequestInfo<'_>) -> Result<Option<Principal>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Some(Principal::new("too-late")))
        }
    }

    fn pipeline(resolver: Arc<dyn IdentityResolver>, clock: &MockClock) -> AdmissionPipeline {
        AdmissionPipeline::new(
            RateLimiter::new(),
            PolicyTable::compiled().unwrap(),
            resolver,
            Arc::new(clock.clone()),
        )
    }

    fn from_ip(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    async fn evaluate(
        pipeline: &AdmissionPipeline,
        method: Method,
        path: &str,
        headers: &HeaderMap,
    ) -> AdmissionOutcome {
        pipeline.evaluate(&RequestInfo::new(&method, path, headers)).await
    }

    #[tokio::test]
    async fn test_principal_on_protected_path_is_forwarded() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(Some("user-42")), &clock);

        let outcome = evaluate(&pipeline, Method::GET, "/api/widgets", &HeaderMap::new()).await;
        assert_eq!(outcome, AdmissionOutcome::Forward);

        let key = BucketKey::for_principal("user-42", "unknown");
        assert_eq!(pipeline.limiter().counter_value(&key), Some(1));
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthorized_without_consuming_budget() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(None), &clock);

        let outcome = evaluate(&pipeline, Method::GET, "/api/widgets", &HeaderMap::new()).await;

        assert_eq!(outcome, AdmissionOutcome::Unauthorized);
        assert!(pipeline.limiter().store().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_failure_fails_closed() {
        let clock = MockClock::default();
        let pipeline = pipeline(Arc::new(FailingResolver), &clock);

        let outcome = evaluate(&pipeline, Method::GET, "/dashboard", &HeaderMap::new()).await;
        assert_eq!(outcome, AdmissionOutcome::Unauthorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_timeout_fails_closed() {
        let clock = MockClock::default();
        let pipeline = pipeline(Arc::new(SlowResolver), &clock)
            .with_resolver_timeout(Duration::from_millis(100));

        let outcome = evaluate(&pipeline, Method::GET, "/api/widgets", &HeaderMap::new()).await;
        assert_eq!(outcome, AdmissionOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn test_sixth_auth_attempt_is_rate_limited() {
        let clock = MockClock::default();
        let resolver = StaticResolver::new(None);
        let pipeline = pipeline(resolver.clone(), &clock);
        let headers = from_ip("203.0.113.50");

        for _ in 0..5 {
            let outcome = evaluate(&pipeline, Method::POST, "/api/auth/signin", &headers).await;
            assert_eq!(outcome, AdmissionOutcome::Forward);
            clock.advance(Duration::from_secs(1));
        }

        let outcome = evaluate(&pipeline, Method::POST, "/api/auth/signin", &headers).await;
        match outcome {
            AdmissionOutcome::RateLimited {
                limit,
                remaining,
                retry_after_secs,
            } => {
                assert_eq!(limit, 5);
                assert_eq!(remaining, 0);
                assert!((1..=60).contains(&retry_after_secs));
                assert_eq!(retry_after_secs, 55);
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dot_segments_do_not_skip_authentication() {
        let clock = MockClock::default();
        let resolver = StaticResolver::new(None);
        let pipeline = pipeline(resolver.clone(), &clock);
        let headers = from_ip("192.0.2.99");

        for path in [
            "/static/../api/x",
            "/static/../api/widgets",
            "/api/webhooks/../widgets",
            "/api/webhooks/%2e%2e/widgets",
            "/images/./../api/admin",
        ] {
            let outcome = evaluate(&pipeline, Method::POST, path, &headers).await;
            assert_eq!(outcome, AdmissionOutcome::Unauthorized, "{} must need a principal", path);
        }

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 5);
        assert!(pipeline.limiter().store().is_empty());
    }

    #[tokio::test]
    async fn test_dot_segments_resolve_before_scope_selection() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(None), &clock);
        let headers = from_ip("192.0.2.98");

        let path = "/api/x/../webhooks/stripe";
        let outcome = evaluate(&pipeline, Method::POST, path, &headers).await;
        assert_eq!(outcome, AdmissionOutcome::Forward);

        let webhook_key = BucketKey::new(Scope::WebhookByIp, "192.0.2.98");
        assert_eq!(pipeline.limiter().counter_value(&webhook_key), Some(1));
    }

    #[tokio::test]
    async fn test_non_mutating_auth_request_needs_principal() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(None), &clock);

        let headers = from_ip("10.0.0.1");
        let outcome = evaluate(&pipeline, Method::GET, "/api/auth/session", &headers).await;
        assert_eq!(outcome, AdmissionOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn test_webhooks_skip_identity_and_use_ip_budget() {
        let clock = MockClock::default();
        let resolver = StaticResolver::new(None);
        let pipeline = pipeline(resolver.clone(), &clock);
        let headers = from_ip("192.0.2.10");

        for _ in 0..100 {
            let outcome = evaluate(&pipeline, Method::POST, "/api/webhooks/stripe", &headers).await;
            assert_eq!(outcome, AdmissionOutcome::Forward);
        }
        let outcome = evaluate(&pipeline, Method::POST, "/api/webhooks/stripe", &headers).await;
        assert!(matches!(outcome, AdmissionOutcome::RateLimited { limit: 100, .. }));

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_webhook_scope_leaves_auth_scope_untouched() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(None), &clock);
        let headers = from_ip("192.0.2.11");

        for _ in 0..150 {
            evaluate(&pipeline, Method::POST, "/api/webhooks/github", &headers).await;
        }

        let auth_key = BucketKey::new(Scope::AuthAttemptByIp, "192.0.2.11");
        assert_eq!(pipeline.limiter().counter_value(&auth_key), None);

        let outcome = evaluate(&pipeline, Method::POST, "/api/auth/signin", &headers).await;
        assert_eq!(outcome, AdmissionOutcome::Forward);
    }

    #[tokio::test]
    async fn test_public_paths_bypass_exhausted_budgets() {
        let clock = MockClock::default();
        let resolver = StaticResolver::new(None);
        let pipeline = pipeline(resolver.clone(), &clock);
        let headers = from_ip("198.51.100.200");

        for _ in 0..10 {
            evaluate(&pipeline, Method::POST, "/api/auth/signin", &headers).await;
        }
        for _ in 0..120 {
            evaluate(&pipeline, Method::POST, "/api/webhooks/stripe", &headers).await;
        }
        let entries = pipeline.limiter().store().len();

        for path in [
            "/",
            "/favicon.ico",
            "/api/auth/callback/google",
            "/_next/static/app.js",
            "/login?next=/x",
        ] {
            let outcome = evaluate(&pipeline, Method::POST, path, &headers).await;
            assert_eq!(outcome, AdmissionOutcome::Forward, "{} should be public", path);
        }

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.limiter().store().len(), entries);
    }

    #[tokio::test]
    async fn test_identity_budget_resets_with_new_window() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(Some("user-7")), &clock);
        let headers = HeaderMap::new();

        for _ in 0..60 {
            evaluate(&pipeline, Method::GET, "/api/widgets", &headers).await;
        }
        let outcome = evaluate(&pipeline, Method::GET, "/api/widgets", &headers).await;
        assert!(matches!(outcome, AdmissionOutcome::RateLimited { limit: 60, .. }));

        clock.advance(Duration::from_secs(60));
        let outcome = evaluate(&pipeline, Method::GET, "/api/widgets", &headers).await;
        assert_eq!(outcome, AdmissionOutcome::Forward);
    }

    #[tokio::test]
    async fn test_empty_principal_uses_ip_fallback() {
        let clock = MockClock::default();
        let pipeline = pipeline(StaticResolver::new(Some("")), &clock);

        let headers = from_ip("10.9.8.7");
        let outcome = evaluate(&pipeline, Method::GET, "/api/widgets", &headers).await;
        assert_eq!(outcome, AdmissionOutcome::Forward);

        let key = BucketKey::new(Scope::ApiByIdentity, "ip:10.9.8.7");
        assert_eq!(pipeline.limiter().counter_value(&key), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_admit_exactly_limit() {
        let clock = MockClock::new(Instant::now());
        let pipeline = Arc::new(pipeline(StaticResolver::new(None), &clock));
        let extra = 20;

        let tasks: Vec<_> = (0..5 + extra)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let headers = from_ip("203.0.113.77");
                    evaluate(&pipeline, Method::POST, "/api/auth/signin", &headers).await
                })
            })
            .collect();

        let outcomes = futures::future::join_all(tasks).await;
        let forwarded = outcomes
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(AdmissionOutcome::is_forward)
            .count();

        assert_eq!(forwarded, 5);
    }
}
