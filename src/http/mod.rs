//! HTTP surface: axum middleware and the standalone gate server.

mod middleware;
mod server;

pub use middleware::{admission_middleware, protect};
pub use server::HttpServer;
