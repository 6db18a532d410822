//! Tool endpoints. Responses carry the operation result as JSON; failures use
//! [`ApiError`] with the error kind as `error`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use mailwright_core::OperationError;
use serde::Serialize;
use serde_json::Value;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tools))
        .route("/{name}", get(get_tool).post(call_tool))
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_id: Option<String>,
}

impl ApiError {
    fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            reply_id: None,
        }
    }

    fn not_found(name: &str) -> Self {
        Self::new("not_found", format!("no tool named `{name}`"))
    }
}

fn status_for(err: &OperationError) -> StatusCode {
    match err {
        OperationError::Schema(_) => StatusCode::BAD_REQUEST,
        OperationError::Auth(_) => StatusCode::UNAUTHORIZED,
        OperationError::Transport(_) => StatusCode::GATEWAY_TIMEOUT,
        // The reply exists; only its labels are missing.
        OperationError::ReplyLabels { .. } => StatusCode::MULTI_STATUS,
        OperationError::Remote { .. } | OperationError::Send { .. } | OperationError::Decode(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn error_response(err: OperationError) -> Response {
    let status = status_for(&err);
    let mut body = ApiError::new(err.kind(), err.to_string());
    if let OperationError::ReplyLabels { reply_id, .. } = &err {
        body.reply_id = Some(reply_id.clone());
    }
    (status, Json(body)).into_response()
}

/// GET /tools
async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.definitions().to_vec())
}

/// GET /tools/{name}
async fn get_tool(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.get(&name) {
        Some(definition) => (StatusCode::OK, Json(definition.clone())).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ApiError::not_found(&name))).into_response(),
    }
}

/// POST /tools/{name}
///
/// An empty body is the same as `{}`.
async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if state.registry.get(&name).is_none() {
        return (StatusCode::NOT_FOUND, Json(ApiError::not_found(&name))).into_response();
    }

    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(arguments) => arguments,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiError::new("schema", format!("body is not valid JSON: {err}"))),
                )
                    .into_response();
            }
        }
    };

    match state.registry.invoke(state.ops.as_ref(), &name, arguments).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => {
            tracing::warn!(tool = %name, kind = err.kind(), "tool call failed: {}", err);
            error_response(err)
        }
    }
}
