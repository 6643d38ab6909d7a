//! Turnstile - In-Memory HTTP Admission Gate
//!
//! This crate screens inbound HTTP requests before they reach business
//! logic. Each request is classified as public or protected, protected
//! requests are matched to a rate-limiting scope (webhook ingestion,
//! authentication attempts, or identity-scoped API use), and the gate
//! answers with forward, 401 or 429. Counter state lives in a single
//! process; see `ratelimit::BucketStore` for the seam a shared store would
//! plug into.

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
