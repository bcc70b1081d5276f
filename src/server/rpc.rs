//! HTTP surface of the sync server.
//!
//! - `POST /rpc`: JSON-RPC 1.0, method `T.Sync`
//! - `GET /health`: health check

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use punch_core::sync::{RpcRequest, RpcResponse, SyncArgs, SyncReply, SYNC_METHOD};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::keys::ApiKeyStore;
use super::storage::{ServerError, ServerStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: ServerStore,
    pub keys: Arc<ApiKeyStore>,
}

impl AppState {
    pub fn new(store: ServerStore, keys: ApiKeyStore) -> Self {
        Self {
            store,
            keys: Arc::new(keys),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rpc", post(rpc))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn rejected(id: Value, message: impl Into<String>) -> Response {
    Json(RpcResponse::<SyncReply>::failure(id, message)).into_response()
}

async fn rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RpcRequest<Value> = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid JSON-RPC request: {}", e),
            )
                .into_response();
        }
    };

    let id = request.id;
    if request.method != SYNC_METHOD {
        return rejected(id, format!("unknown method {}", request.method));
    }

    let Some(param) = request.params.into_iter().next() else {
        return rejected(id, "missing params");
    };
    let args: SyncArgs = match serde_json::from_value(param) {
        Ok(args) => args,
        Err(e) => return rejected(id, format!("invalid params: {}", e)),
    };

    if !state.keys.authorize(&args.owner, &args.key) {
        tracing::warn!(owner = %args.owner, "rejected sync request: bad key");
        return rejected(id, "unauthorized");
    }

    match state.store.sync(&args).await {
        Ok(reply) => Json(RpcResponse::success(id, reply)).into_response(),
        Err(e @ (ServerError::AheadOfServer { .. } | ServerError::InvalidRequest(_))) => {
            tracing::warn!(owner = %args.owner, "rejected sync request: {}", e);
            rejected(id, e.to_string())
        }
        Err(e) => {
            tracing::error!(owner = %args.owner, "sync failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RpcResponse::<SyncReply>::failure(id, "internal error")),
            )
                .into_response()
        }
    }
}
