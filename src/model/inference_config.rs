//! モデルメタデータから推論に必要な情報を取得

use tracing::info;

use crate::ml::{ModelConfig, NEGATIVE_CLASS, POSITIVE_CLASS};
use crate::model::model_metadata::ModelMetadata;

/// 推論設定
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// クラスラベル（ラベルID順）
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub model_input_size: usize,

    /// 入力層のリスケール係数
    pub rescale: f64,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            model_input_size: metadata.image_size as usize,
            rescale: metadata.rescale,
        }
    }

    /// ネットワーク構成
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            image_size: self.model_input_size,
            rescale: self.rescale,
        }
    }

    /// 学習時のクラスラベルが推論側の想定と一致するか
    pub fn labels_match(&self) -> bool {
        self.class_labels.len() == 2
            && self.class_labels[0] == NEGATIVE_CLASS
            && self.class_labels[1] == POSITIVE_CLASS
    }

    /// 設定情報をログに出力
    pub fn log_info(&self) {
        info!(
            class_labels = %self.class_labels.join(", "),
            model_input_size = self.model_input_size,
            rescale = self.rescale,
            "推論設定"
        );
    }
}
