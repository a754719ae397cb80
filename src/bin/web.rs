//! Hive Web 入口
//!
//! 启动: cargo run --bin hive-web --features web
//! 消息平台回调打到 POST /turn，健康检查 GET /health。

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hive::config::{load_config, AppConfig};
use hive::core::Engine;
use hive::observability;

/// POST /turn 请求体
#[derive(Debug, Deserialize)]
struct TurnRequest {
    conversation_key: String,
    message: String,
    /// 可选幂等键：平台重投同一回合时不会重复追加
    turn_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct TurnResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn handle_turn(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, Json<ErrorResponse>)> {
    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Message is required".to_string(),
            }),
        ));
    }

    engine
        .handle_turn_with(
            &req.conversation_key,
            &req.message,
            req.turn_key.as_deref(),
            CancellationToken::new(),
        )
        .await
        .map(|response| Json(TurnResponse { response }))
        .map_err(|err| {
            tracing::error!(key = %req.conversation_key, error = %err, "turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
        })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "hive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let engine = Arc::new(Engine::from_config(&cfg));

    let app = Router::new()
        .route("/turn", post(handle_turn))
        .route("/health", get(health))
        .with_state(engine);

    let addr = std::env::var("HIVE_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
