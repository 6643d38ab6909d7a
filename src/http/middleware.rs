//! Axum middleware running the admission pipeline.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tracing::instrument;

use crate::admission::{AdmissionPipeline, RequestInfo};

/// Evaluate the request and either forward it unmodified or answer with
/// the rejection.
#[instrument(
    skip_all,
    fields(
        method = %request.method(),
        path = %request.uri().path(),
    )
)]
pub async fn admission_middleware(
    State(pipeline): State<Arc<AdmissionPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let outcome = pipeline
        .evaluate(&RequestInfo::new(&parts.method, parts.uri.path(), &parts.headers))
        .await;

    match outcome.into_rejection() {
        Some(rejection) => rejection,
        None => next.run(Request::from_parts(parts, body)).await,
    }
}

/// Put every route of `router` (and its fallback) behind the gate.
///
/// Routes added to the returned router afterwards are not gated.
pub fn protect<S>(router: Router<S>, pipeline: Arc<AdmissionPipeline>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(pipeline, admission_middleware))
}
