//! アプリケーション設定管理モジュール
//!
//! サーバー・モデル・トレーニングの設定をJSON形式で保存・読み込みします。
//! 読み込み後に環境変数（`FORMALIN_*`）で上書きできます。

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ml::ModelConfig;

/// 推論サーバー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 待ち受けアドレス
    pub host: String,
    /// 待ち受けポート
    pub port: u16,
    /// 起動時に読み込むモデルアーティファクトのパス
    pub model_path: String,
    /// リクエストボディの上限（バイト）
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            model_path: "model/model.tar.gz".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// モデル設定
///
/// 学習と推論の両方がこの入力解像度を使います。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 入力画像サイズ（正方形）
    pub image_size: usize,
    /// 入力層のリスケール係数（前処理で既に [0, 1] に正規化済み）
    pub rescale: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            image_size: 224,
            rescale: 1.0,
        }
    }
}

impl ModelSettings {
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            image_size: self.image_size,
            rescale: self.rescale,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// クラスごとのサブフォルダを含む学習データのルート
    pub data_dir: String,
    /// 学習済みモデルの出力先（既存ファイルは上書き）
    pub output_path: String,
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 検証データの割合
    pub validation_split: f32,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            data_dir: "train".to_string(),
            output_path: "model/model.tar.gz".to_string(),
            num_epochs: 20,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 推論サーバー設定
    pub server: ServerSettings,
    /// モデル設定
    pub model: ModelSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない・壊れている場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!(path = %path.display(), "設定ファイルを読み込みました");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "設定ファイルの読み込みに失敗しました。デフォルト設定を使用します");
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 環境変数で設定を上書き
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("FORMALIN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FORMALIN_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("FORMALIN_MODEL_PATH") {
            self.server.model_path = path;
        }
        if let Some(size) = lookup("FORMALIN_IMAGE_SIZE").and_then(|s| s.parse().ok()) {
            self.model.image_size = size;
        }
        if let Some(dir) = lookup("FORMALIN_DATA_DIR") {
            self.training.data_dir = dir;
        }
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model.model_config().feature_map_size().is_none() {
            bail!(
                "model.image_size {} is too small for three conv+pool stages",
                self.model.image_size
            );
        }
        if !(self.training.validation_split > 0.0 && self.training.validation_split < 1.0) {
            bail!(
                "training.validation_split must be in (0, 1), got {}",
                self.training.validation_split
            );
        }
        if self.training.num_epochs == 0 || self.training.batch_size == 0 {
            bail!("training.num_epochs and training.batch_size must be non-zero");
        }
        if self.server.max_body_bytes == 0 {
            bail!("server.max_body_bytes must be non-zero");
        }
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn display(&self) {
        info!(
            host = %self.server.host,
            port = self.server.port,
            model_path = %self.server.model_path,
            max_body_mb = self.server.max_body_bytes / 1024 / 1024,
            "サーバー設定"
        );
        info!(
            image_size = self.model.image_size,
            rescale = self.model.rescale,
            "モデル設定"
        );
        info!(
            data_dir = %self.training.data_dir,
            output_path = %self.training.output_path,
            num_epochs = self.training.num_epochs,
            batch_size = self.training.batch_size,
            validation_split = self.training.validation_split,
            learning_rate = self.training.learning_rate,
            seed = self.training.seed,
            "トレーニング設定"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.training.num_epochs, 20);
        assert_eq!(config.training.batch_size, 32);
        assert!((config.training.validation_split - 0.2).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "server": { "port": 8080 }, "model": { "image_size": 64 } }"#)
                .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.model_path, "model/model.tar.gz");
        assert_eq!(config.model.image_size, 64);
        assert_eq!(config.model.rescale, 1.0);
        assert_eq!(config.training.seed, 42);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.training.data_dir = "dataset".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.training.data_dir, "dataset");
        assert_eq!(loaded.model.image_size, config.model.image_size);
    }

    #[test]
    fn test_load_or_default_on_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_or_default(&path);
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("FORMALIN_PORT", "9000"),
            ("FORMALIN_MODEL_PATH", "/srv/model.tar.gz"),
            ("FORMALIN_IMAGE_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.model_path, "/srv/model.tar.gz");
        assert_eq!(config.model.image_size, 224);
    }

    #[test]
    fn test_validate_rejects_tiny_image_and_bad_split() {
        let mut config = AppConfig::default();
        config.model.image_size = 16;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.training.validation_split = 1.0;
        assert!(config.validate().is_err());
    }
}
