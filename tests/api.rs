//! HTTP APIの結合テスト（モック推論器）

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use formalin_detector::error::Result;
use formalin_detector::ml::{ClassProbabilities, ImageTensor, Predictor};
use formalin_detector::model::ServerSettings;
use formalin_detector::server::{router, HttpState, ModelSlot};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const IMAGE_SIZE: usize = 8;

/// 常に [0.9, 0.1] を返す推論器
#[derive(Default)]
struct MockPredictor {
    calls: AtomicUsize,
}

impl Predictor for MockPredictor {
    fn image_size(&self) -> usize {
        IMAGE_SIZE
    }

    fn predict(&self, image: &ImageTensor) -> Result<ClassProbabilities> {
        assert_eq!(image.shape(), [IMAGE_SIZE, IMAGE_SIZE, 3]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ClassProbabilities::new(0.9, 0.1))
    }
}

fn png_base64(width: u32, height: u32) -> String {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 20) as u8, (y * 20) as u8, 128, 200])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    STANDARD.encode(bytes)
}

fn app_with(slot: ModelSlot) -> Router {
    router(HttpState::new(Arc::new(slot)), &ServerSettings::default())
}

fn ready_app() -> (Router, Arc<MockPredictor>) {
    let predictor = Arc::new(MockPredictor::default());
    let app = app_with(ModelSlot::ready(predictor.clone()));
    (app, predictor)
}

fn predict_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn predict_returns_formatted_probabilities() {
    let (app, predictor) = ready_app();
    let body = serde_json::json!({ "image": png_base64(20, 12) }).to_string();

    let (status, body) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        r#"{"detail_prediction":{"formalin":"90.00%","non_formalin":"10.00%"},"prediction":"formalin"}"#
    );
    assert_eq!(predictor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn predict_accepts_data_url() {
    let (app, _) = ready_app();
    let image = format!("data:image/png;base64,{}", png_base64(4, 4));
    let body = serde_json::json!({ "image": image }).to_string();

    let (status, _) = send(app, predict_request(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_image_is_client_error() {
    let (app, predictor) = ready_app();

    let (status, body) = send(app, predict_request("{}".to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "invalid_input");
    assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_json_is_client_error() {
    let (app, _) = ready_app();
    let (status, body) = send(app, predict_request("{not json".to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "invalid_input");
}

#[tokio::test]
async fn invalid_base64_is_client_error() {
    let (app, _) = ready_app();
    let body = serde_json::json!({ "image": "%%%" }).to_string();

    let (status, _) = send(app, predict_request(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn undecodable_image_is_server_error() {
    let (app, _) = ready_app();
    let body = serde_json::json!({ "image": STANDARD.encode(b"definitely not an image") }).to_string();

    let (status, body) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "decode");
}

#[tokio::test]
async fn predict_before_model_is_loaded() {
    let app = app_with(ModelSlot::new());
    let body = serde_json::json!({ "image": png_base64(4, 4) }).to_string();

    let (status, body) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "model_not_ready");
}

#[tokio::test]
async fn predict_after_failed_load() {
    let slot = ModelSlot::new();
    slot.set_failed("model.bin missing");
    let body = serde_json::json!({ "image": png_base64(4, 4) }).to_string();

    let (status, body) = send(app_with(slot), predict_request(body)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "model_load");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let predictor = Arc::new(MockPredictor::default());
    let settings = ServerSettings {
        max_body_bytes: 64,
        ..ServerSettings::default()
    };
    let app = router(
        HttpState::new(Arc::new(ModelSlot::ready(predictor))),
        &settings,
    );
    let body = serde_json::json!({ "image": png_base64(16, 16) }).to_string();

    let (status, _) = send(app, predict_request(body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn index_returns_text() {
    let (app, _) = ready_app();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.is_empty());
}

#[tokio::test]
async fn health_reports_readiness() {
    let (app, _) = ready_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ready");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app_with(ModelSlot::new()), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "loading");
}
