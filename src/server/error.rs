use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::error::DetectorError;
use crate::server::dto::ErrorBody;

/// HTTPハンドラのエラー
#[derive(Debug)]
pub enum ApiError {
    Detector(DetectorError),
    PayloadTooLarge(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Detector(e) => match e {
                DetectorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                // 読み込み中・読み込み失敗はどちらも「利用不可」
                DetectorError::ModelNotReady | DetectorError::ModelLoad(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                DetectorError::Decode(_)
                | DetectorError::Inference(_)
                | DetectorError::TrainingIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Detector(e) => ErrorBody {
                error: e.kind(),
                message: e.to_string(),
            },
            ApiError::PayloadTooLarge(message) => ErrorBody {
                error: "payload_too_large",
                message: message.clone(),
            },
        }
    }
}

impl From<DetectorError> for ApiError {
    fn from(e: DetectorError) -> Self {
        ApiError::Detector(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            error!(status = status.as_u16(), kind = body.error, message = %body.message, "リクエストの処理に失敗しました");
        } else {
            warn!(status = status.as_u16(), kind = body.error, message = %body.message, "不正なリクエスト");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DetectorError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (DetectorError::Decode("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (DetectorError::Inference("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (DetectorError::ModelLoad("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (DetectorError::ModelNotReady, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(
            ApiError::PayloadTooLarge("too big".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
