//! Built-in handlers served on the shared port.

use axum::extract::Extension;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::http::json::{JsonBody, JsonRejection};
use crate::json::TokenKind;
use crate::sniff::TransportInfo;

/// Demonstration routes: health, transport inspection and JSON handling.
pub fn demo_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/transport", get(transport))
        .route("/echo", post(echo))
        .route("/keys", post(keys))
}

async fn health() -> &'static str {
    "ok"
}

/// How this connection reached the HTTP layer.
async fn transport(info: Option<Extension<TransportInfo>>) -> Json<Value> {
    let body = match info {
        Some(Extension(info)) => json!({
            "connection": info.connection_id.to_string(),
            "peer": info.peer.to_string(),
            "layers": info.layers.to_string(),
        }),
        None => json!({ "layers": "unknown" }),
    };
    Json(body)
}

/// Parse the body and send it back, normalised.
async fn echo(body: JsonBody) -> Result<Json<Value>, JsonRejection> {
    let mut reader = body.reader();
    let value = reader.read_value()?;
    Ok(Json(value))
}

/// Names of the top-level object, skipping every value unread.
async fn keys(body: JsonBody) -> Result<Json<Value>, JsonRejection> {
    let mut reader = body.reader();
    if reader.peek()? != TokenKind::BeginObject {
        return Ok(Json(json!({ "keys": [] })));
    }
    reader.begin_object()?;
    let mut names = Vec::new();
    while let Some(name) = reader.next_name_or_none()? {
        names.push(name.into_owned());
        reader.skip_value()?;
    }
    reader.end_object()?;
    Ok(Json(json!({ "keys": names })))
}
