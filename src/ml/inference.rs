//! モデル推論機能

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::{DetectorError, Result};
use crate::ml::{
    ClassProbabilities, FormalinClassifier, ImageTensor, InferenceBackend, InferenceDevice,
    TensorScope,
};
use crate::model::{load_artifact, log_metadata_info, InferenceConfig};

/// 前処理済み画像から2クラスの確率を返す推論器
///
/// HTTP層はこのトレイト越しにモデルを呼び出します。
pub trait Predictor: Send + Sync {
    /// 期待する入力画像サイズ（正方形）
    fn image_size(&self) -> usize;

    /// 1枚の画像を推論
    fn predict(&self, image: &ImageTensor) -> Result<ClassProbabilities>;
}

/// 推論エンジン
///
/// 学習済みネットワークを読み取り専用で保持します。バックエンドによっては
/// モジュールが `Sync` でないため、順伝播はロックで直列化します。
pub struct InferenceEngine {
    model: Mutex<FormalinClassifier<InferenceBackend>>,
    config: InferenceConfig,
    device: InferenceDevice,
    scope: TensorScope,
}

impl InferenceEngine {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_error = |e: anyhow::Error| {
            DetectorError::ModelLoad(format!("{}: {:#}", model_path.display(), e))
        };

        let (metadata, model_binary) = load_artifact(model_path).map_err(load_error)?;
        log_metadata_info(&metadata);

        let config = InferenceConfig::from_metadata(&metadata);
        if !config.labels_match() {
            warn!(
                class_labels = %config.class_labels.join(", "),
                "クラスラベルが想定と異なります（出力は P(formalin) として扱います）"
            );
        }

        let device = InferenceDevice::default();
        let model = config
            .model_config()
            .init::<InferenceBackend>(&device)
            .map_err(load_error)?;

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = Recorder::<InferenceBackend>::load(&recorder, model_binary, &device)
            .map_err(|e| DetectorError::ModelLoad(format!("モデル重みの読み込みエラー: {:?}", e)))?;
        let model = model.load_record(record);

        info!(
            path = %model_path.display(),
            num_params = model.num_params(),
            "モデルを読み込みました"
        );

        Ok(Self::from_model(model, config, device))
    }

    /// 構築済みのネットワークから推論エンジンを作成
    pub fn from_model(
        model: FormalinClassifier<InferenceBackend>,
        config: InferenceConfig,
        device: InferenceDevice,
    ) -> Self {
        config.log_info();
        Self {
            model: Mutex::new(model),
            config,
            device,
            scope: TensorScope::new(),
        }
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// 推論中の出力ガード数（リクエストが終われば 0 に戻る）
    pub fn live_tensors(&self) -> usize {
        self.scope.live()
    }
}

impl Predictor for InferenceEngine {
    fn image_size(&self) -> usize {
        self.config.model_input_size
    }

    fn predict(&self, image: &ImageTensor) -> Result<ClassProbabilities> {
        let [height, width, _] = image.shape();
        let expected = self.config.model_input_size;
        if height != expected || width != expected {
            return Err(DetectorError::Inference(format!(
                "input is {}x{} but the model expects {}x{}",
                height, width, expected, expected
            )));
        }

        // Tensorに変換 [1, size, size, 3]（所有権ごとモデルに渡す）
        let input = image.to_batch::<InferenceBackend>(&self.device);

        let output = {
            // 重みは変更しないので、ロック汚染は無視してよい
            let model = self.model.lock().unwrap_or_else(|e| e.into_inner());
            self.scope.track(model.predict(input))
        };

        let values = output
            .to_data()
            .to_vec::<f32>()
            .map_err(|e| DetectorError::Inference(format!("推論結果の取得エラー: {:?}", e)))?;

        let p = values
            .first()
            .copied()
            .ok_or_else(|| DetectorError::Inference("model returned no output".to_string()))?;

        Ok(ClassProbabilities::from_sigmoid(p))
    }
}
