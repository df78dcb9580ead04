use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use crate::error::{DetectorError, Result};
use crate::ml::{InferenceEngine, Predictor};

/// モデルの読み込み状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed,
}

/// 起動後に一度だけ設定される共有モデル
///
/// 未設定の間は「読み込み中」、失敗した場合はその理由を保持し続けます。
#[derive(Default)]
pub struct ModelSlot {
    cell: OnceLock<std::result::Result<Arc<dyn Predictor>, String>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 読み込み済みの推論器で初期化
    pub fn ready(predictor: Arc<dyn Predictor>) -> Self {
        let slot = Self::new();
        slot.set_ready(predictor);
        slot
    }

    /// 読み込み完了。二度目以降の設定は無視して `false` を返す
    pub fn set_ready(&self, predictor: Arc<dyn Predictor>) -> bool {
        self.cell.set(Ok(predictor)).is_ok()
    }

    /// 読み込み失敗。二度目以降の設定は無視して `false` を返す
    pub fn set_failed(&self, reason: impl Into<String>) -> bool {
        self.cell.set(Err(reason.into())).is_ok()
    }

    pub fn status(&self) -> ModelStatus {
        match self.cell.get() {
            None => ModelStatus::Loading,
            Some(Ok(_)) => ModelStatus::Ready,
            Some(Err(_)) => ModelStatus::Failed,
        }
    }

    /// 推論器を取得。準備ができていなければエラー
    pub fn get(&self) -> Result<Arc<dyn Predictor>> {
        match self.cell.get() {
            None => Err(DetectorError::ModelNotReady),
            Some(Ok(predictor)) => Ok(Arc::clone(predictor)),
            Some(Err(reason)) => Err(DetectorError::ModelLoad(reason.clone())),
        }
    }
}

/// HTTPハンドラ間で共有する状態
#[derive(Clone)]
pub struct HttpState {
    pub model: Arc<ModelSlot>,
}

impl HttpState {
    pub fn new(model: Arc<ModelSlot>) -> Self {
        Self { model }
    }
}

/// モデルをブロッキングスレッドで読み込み、結果をスロットに設定する
///
/// 失敗してもプロセスは終了せず、以後のリクエストはすべて失敗として返します。
pub fn spawn_model_loader(slot: Arc<ModelSlot>, model_path: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(path = %model_path.display(), "モデルの読み込みを開始します");
        let path = model_path.clone();
        let loaded = tokio::task::spawn_blocking(move || InferenceEngine::load(&path)).await;

        match loaded {
            Ok(Ok(engine)) => {
                slot.set_ready(Arc::new(engine));
                info!(path = %model_path.display(), "モデルの準備ができました");
            }
            Ok(Err(e)) => {
                error!(path = %model_path.display(), error = %e, "モデルの読み込みに失敗しました。推論リクエストはすべて失敗します");
                slot.set_failed(e.to_string());
            }
            Err(e) => {
                error!(path = %model_path.display(), error = %e, "モデル読み込みスレッドが異常終了しました");
                slot.set_failed(format!("model loader crashed: {}", e));
            }
        }
    })
}
