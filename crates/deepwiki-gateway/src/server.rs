use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderName, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use serde_json::{Value, json};

use crate::catalog::{ServerInfo, server_info};
use crate::encoder::encode;
use crate::gateway::Gateway;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Mounts the tool routes under `/mcp` and `/sse`, both backed by the same
/// gateway. `/mcp/sse` is kept as an alias of the stream route.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .nest("/mcp", tool_routes().route("/sse", post(stream_tool)))
        .nest("/sse", tool_routes())
        .with_state(gateway)
}

fn tool_routes() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/stream", post(stream_tool))
        .route("/info", get(tool_catalog).post(tool_catalog))
        .route("/ping", get(ping))
}

async fn stream_tool(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Response {
    let frames = gateway
        .invoke_json(&body)
        .map(|event| Ok::<_, Infallible>(encode(&event)));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

async fn tool_catalog(State(gateway): State<Arc<Gateway>>) -> Json<ServerInfo> {
    Json(server_info(gateway.context().providers.descriptors()))
}

async fn ping() -> Json<Value> {
    Json(json!({ "ok": true }))
}
