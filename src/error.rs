//! エラー型の定義
//!
//! 推論リクエスト単位のエラーと、起動時・学習時の致命的なエラーを区別します。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    /// リクエストの形式が不正（`image` フィールド欠落、base64不正など）
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 画像としてデコードできないバイト列
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// 順伝播中の失敗（形状不一致など）
    #[error("inference failed: {0}")]
    Inference(String),

    /// モデルアーティファクトの読み込み失敗
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// モデルがまだ読み込まれていない
    #[error("model is not ready yet")]
    ModelNotReady,

    /// 学習データの読み込み・モデルの書き出しの失敗
    #[error("training I/O error: {0}")]
    TrainingIo(String),
}

impl DetectorError {
    /// APIレスポンスに載せるエラー種別
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorError::InvalidInput(_) => "invalid_input",
            DetectorError::Decode(_) => "decode",
            DetectorError::Inference(_) => "inference",
            DetectorError::ModelLoad(_) => "model_load",
            DetectorError::ModelNotReady => "model_not_ready",
            DetectorError::TrainingIo(_) => "training_io",
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
