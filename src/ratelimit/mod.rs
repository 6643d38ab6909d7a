//! Rate limiting logic and state management.

mod key;
mod limiter;
mod policy;
mod store;
mod sweeper;

pub use key::BucketKey;
pub use limiter::{RateLimitDecision, RateLimiter};
pub use policy::{OverflowPolicy, PolicyTable, RateLimitPolicy, Scope};
pub use store::{BucketEntry, BucketHit, BucketStore, InMemoryBucketStore};
pub use sweeper::spawn_sweeper;
