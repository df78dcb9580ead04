use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::DetectorError;
use crate::ml::preprocess_bytes;
use crate::server::dto::{PredictRequest, PredictResponse};
use crate::server::error::ApiError;
use crate::server::state::{HttpState, ModelStatus};

/// GET /
pub async fn index() -> &'static str {
    "Formalin detector is running"
}

/// GET /health
pub async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    let status = state.model.status();
    let code = match status {
        ModelStatus::Ready => StatusCode::OK,
        ModelStatus::Loading | ModelStatus::Failed => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(json!({ "status": status })))
}

/// POST /predict
pub async fn predict(
    State(state): State<HttpState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();

    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            DetectorError::InvalidInput(rejection.body_text()).into()
        }
    })?;
    let bytes = request.image_bytes()?;
    debug!(bytes = bytes.len(), "画像を受信しました");

    let predictor = state.model.get()?;

    // デコード・前処理・順伝播はCPUを占有するのでブロッキングプールで実行
    let probs = tokio::task::spawn_blocking(move || {
        let input = preprocess_bytes(&bytes, predictor.image_size())?;
        predictor.predict(&input)
    })
    .await
    .map_err(|e| DetectorError::Inference(format!("inference task failed: {}", e)))??;

    let response = PredictResponse::from(probs);
    info!(
        prediction = %response.prediction,
        formalin = %response.detail_prediction.formalin,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "推論が完了しました"
    );

    Ok(Json(response))
}
