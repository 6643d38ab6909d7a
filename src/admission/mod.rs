//! Request admission: classification, identity and scope selection.

mod classifier;
mod client_ip;
mod identity;
mod outcome;
mod pipeline;

pub use classifier::{classify, has_segment_prefix, normalize_path, PathClass};
pub use client_ip::{client_ip, FORWARDED_FOR, REAL_IP, UNKNOWN_CLIENT};
pub use identity::{HeaderIdentityResolver, IdentityResolver, Principal};
pub use outcome::{AdmissionOutcome, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
pub use pipeline::AdmissionPipeline;

use axum::http::{HeaderMap, Method};

/// The parts of an inbound request the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub method: &'a Method,
    /// Request path, possibly with query string
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestInfo<'a> {
    pub fn new(method: &'a Method, path: &'a str, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            path,
            headers,
        }
    }
}
