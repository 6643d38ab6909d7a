//! Admission outcomes and their HTTP rendering.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Result of evaluating one request. Built once, consumed immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Let the request through untouched
    Forward,
    /// Protected path without a principal
    Unauthorized,
    /// Scope budget exhausted
    RateLimited {
        limit: u64,
        remaining: u64,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl AdmissionOutcome {
    pub fn is_forward(&self) -> bool {
        matches!(self, AdmissionOutcome::Forward)
    }

    /// The rejection response, or `None` when the request should be
    /// forwarded.
    pub fn into_rejection(self) -> Option<Response> {
        match self {
            AdmissionOutcome::Forward => None,
            AdmissionOutcome::Unauthorized => Some(
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorBody {
                        error: "Unauthorized",
                    }),
                )
                    .into_response(),
            ),
            AdmissionOutcome::RateLimited {
                limit,
                remaining,
                retry_after_secs,
            } => Some(
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        (RETRY_AFTER, HeaderValue::from(retry_after_secs)),
                        (X_RATELIMIT_LIMIT, HeaderValue::from(limit)),
                        (X_RATELIMIT_REMAINING, HeaderValue::from(remaining)),
                    ],
                    Json(ErrorBody {
                        error: "Too many requests",
                    }),
                )
                    .into_response(),
            ),
        }
    }
}
