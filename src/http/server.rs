//! Standalone gate server.

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::protect;
use crate::admission::AdmissionPipeline;
use crate::error::{Result, TurnstileError};

/// HTTP server exposing the gate on its own.
///
/// Admitted requests are answered with `204 No Content`, so the process can
/// sit behind a reverse proxy that asks it for a verdict before routing a
/// request upstream. `/healthz` is served outside the gate.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, pipeline: Arc<AdmissionPipeline>) -> Self {
        let gated = protect(Router::new().fallback(admitted), pipeline);
        let router = gated.route("/healthz", get(health));
        Self { addr, router }
    }

    /// The full router, for embedding or testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP admission gate");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TurnstileError::Server(e.to_string())
            })
    }
}

async fn admitted() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
