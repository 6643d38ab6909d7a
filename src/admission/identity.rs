//! Caller identity as consumed by the gate.
//!
//! The gate never parses or validates credentials. An [`IdentityResolver`]
//! hands it a principal that some upstream component has already verified,
//! or nothing.

use async_trait::async_trait;
use axum::http::HeaderName;

use super::RequestInfo;
use crate::error::{Result, TurnstileError};

/// Resolved identity of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Stable identifier, e.g. a tenant-scoped user id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Source of principals for inbound requests.
///
/// Errors are never treated as an admission: the pipeline maps them to
/// "no principal".
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, request: &RequestInfo<'_>) -> Result<Option<Principal>>;
}

/// Reads the principal from a header set by a trusted upstream
/// authenticator (for example a session-validating proxy).
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    pub fn new(header: &str) -> Result<Self> {
        let header = HeaderName::try_from(header).map_err(|e| {
            TurnstileError::Config(format!("invalid principal header {:?}: {}", header, e))
        })?;
        Ok(Self { header })
    }
}

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, request: &RequestInfo<'_>) -> Result<Option<Principal>> {
        let Some(value) = request.headers.get(&self.header) else {
            return Ok(None);
        };

        let id = value
            .to_str()
            .map_err(|e| {
                TurnstileError::Identity(format!("{} is not valid text: {}", self.header, e))
            })?
            .trim();

        if id.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Principal::new(id)))
        }
    }
}
