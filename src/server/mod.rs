//! HTTP推論サーバー

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::model::{AppConfig, ServerSettings};

pub use dto::{DetailPrediction, PredictRequest, PredictResponse};
pub use error::ApiError;
pub use state::{spawn_model_loader, HttpState, ModelSlot, ModelStatus};

/// ルーターを構築
pub fn router(state: HttpState, settings: &ServerSettings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/predict", post(routes::predict))
        .layer(DefaultBodyLimit::max(settings.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// サーバーを起動して Ctrl-C まで待機
///
/// リッスンを開始してからモデルを読み込むので、読み込み中のリクエストには 503 を返します。
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let settings = config.server;
    let slot = Arc::new(ModelSlot::new());
    let state = HttpState::new(Arc::clone(&slot));
    let app = router(state, &settings);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "サーバーを起動しました");

    spawn_model_loader(slot, PathBuf::from(&settings.model_path));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("サーバーを停止しました");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C ハンドラを登録できませんでした");
        std::future::pending::<()>().await;
    }
    info!("停止シグナルを受信しました");
}
