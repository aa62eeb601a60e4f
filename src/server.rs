use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use crate::event::OriginResponseEvent;
use crate::handler::Handler;
use crate::storage::ObjectStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Accepts origin-response events over HTTP, for running outside Lambda.
pub fn router<S: ObjectStore + 'static>(handler: Arc<Handler<S>>) -> Router {
    Router::new()
        .route("/", post(handle::<S>))
        .route("/health", get(health))
        .with_state(handler)
}

pub async fn serve<S: ObjectStore + 'static>(
    handler: Arc<Handler<S>>,
    port: u16,
) -> Result<(), BoxError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "Image resizing service starting");
    axum::Server::bind(&addr)
        .serve(router(handler).into_make_service())
        .await?;
    Ok(())
}

async fn handle<S: ObjectStore + 'static>(
    State(handler): State<Arc<Handler<S>>>,
    body: Bytes,
) -> Response {
    let event: OriginResponseEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejecting malformed event");
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid origin response event: {e}"),
            )
                .into_response();
        }
    };

    match handler.handle_event(event).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}
