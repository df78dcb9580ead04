//! リクエスト/レスポンスのJSON形式

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};
use crate::ml::{format_percentage, ClassLabel, ClassProbabilities};

/// POST /predict の本文
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    /// base64エンコードされた画像（`data:image/...;base64,` 付きも可）
    #[serde(default)]
    pub image: Option<String>,
}

impl PredictRequest {
    /// 画像のバイト列を取り出す
    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        let encoded = self
            .image
            .as_deref()
            .ok_or_else(|| DetectorError::InvalidInput("missing field `image`".to_string()))?;
        decode_base64_image(encoded)
    }
}

/// base64文字列をデコード
///
/// データURLの接頭辞と前後の空白は取り除きます。
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DetectorError::InvalidInput("`image` is empty".to_string()));
    }

    STANDARD
        .decode(payload)
        .map_err(|e| DetectorError::InvalidInput(format!("`image` is not valid base64: {}", e)))
}

/// 各クラスの確率（百分率文字列）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailPrediction {
    pub formalin: String,
    pub non_formalin: String,
}

/// POST /predict の応答
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub detail_prediction: DetailPrediction,
    pub prediction: ClassLabel,
}

impl From<ClassProbabilities> for PredictResponse {
    fn from(probs: ClassProbabilities) -> Self {
        Self {
            detail_prediction: DetailPrediction {
                formalin: format_percentage(probs.formalin),
                non_formalin: format_percentage(probs.non_formalin),
            },
            prediction: probs.label(),
        }
    }
}

/// エラー応答
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}
