//! モデルメタデータの定義
//!
//! モデルアーティファクト（tar.gz）に `metadata.json` として同梱され、
//! 推論時にネットワーク構成の復元と重みの検証に使われます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::{ModelConfig, CLASS_NAMES};

/// アーティファクト形式のバージョン
pub const FORMAT_VERSION: u32 = 1;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// アーティファクト形式のバージョン
    pub format_version: u32,

    /// クラスラベル（ラベルID順）
    /// 例: ["non formalin", "formalin"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形）
    pub image_size: u32,

    /// 入力層のリスケール係数
    pub rescale: f64,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 学習時のバッチサイズ
    pub batch_size: u32,

    /// 検証データの割合
    pub validation_split: f32,

    /// 学習サンプル数
    pub train_samples: u32,

    /// 検証サンプル数
    pub validation_samples: u32,

    /// model.bin のバイト数（読み込み時の整合性チェック用）
    pub weights_bytes: u64,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 学習時刻を現在時刻にしてメタデータを作成
    pub fn new(model: &ModelConfig, weights_bytes: u64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            class_labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            image_size: model.image_size as u32,
            rescale: model.rescale,
            num_epochs: 0,
            batch_size: 0,
            validation_split: 0.0,
            train_samples: 0,
            validation_samples: 0,
            weights_bytes,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// ネットワーク構成を復元
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            image_size: self.image_size as usize,
            rescale: self.rescale,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        let metadata: Self =
            serde_json::from_str(json).context("Failed to deserialize metadata from JSON")?;
        if metadata.format_version != FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported model format version {} (expected {})",
                metadata.format_version,
                FORMAT_VERSION
            );
        }
        Ok(metadata)
    }
}
