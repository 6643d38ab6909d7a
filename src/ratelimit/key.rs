//! Bucket key generation.

use super::policy::Scope;

/// A key that uniquely identifies one counter window.
///
/// The key is composed of the scope and a discriminant (caller IP, principal
/// id, or an `ip:<addr>` fallback). Equal discriminants under different
/// scopes are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// The scope this bucket belongs to
    pub scope: Scope,
    /// Caller IP or principal id
    pub discriminant: String,
}

impl BucketKey {
    pub fn new(scope: Scope, discriminant: impl Into<String>) -> Self {
        Self {
            scope,
            discriminant: discriminant.into(),
        }
    }

    /// Key for an identity-scoped bucket.
    ///
    /// An empty principal id falls back to `ip:<caller ip>` so that it never
    /// shares a bucket with other empty ids.
    pub fn for_principal(principal_id: &str, caller_ip: &str) -> Self {
        if principal_id.is_empty() {
            Self::new(Scope::ApiByIdentity, format!("ip:{}", caller_ip))
        } else {
            Self::new(Scope::ApiByIdentity, principal_id)
        }
    }

    /// Flat `scope:discriminant` form, as an external counter store would
    /// key it.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.scope.as_str(), self.discriminant)
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
