//! モデル学習

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    data::dataset::Dataset,
    module::Module,
    optim::AdamConfig,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{
        metric::{HammingScore, LossMetric},
        LearnerBuilder, LearningStrategy, MultiLabelClassificationOutput, TrainOutput, TrainStep,
        ValidStep,
    },
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::DetectorError;
use crate::ml::dataset::{scan_dataset, ImageItem, ImageStack};
use crate::ml::{FormalinClassifier, InferenceDevice, TrainingBackend, CHANNELS};
use crate::model::{save_artifact, AppConfig, ModelMetadata};

/// バッチャー
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, _device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * size * size * CHANNELS);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend_from_slice(&item.pixels);
            targets.push(i64::from(item.label));
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, size, size, CHANNELS]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        ImageBatch { images, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// [batch, size, size, 3]
    pub images: Tensor<B, 4>,
    /// [batch, 1]
    pub targets: Tensor<B, 2, Int>,
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<ImageBatch<B>, MultiLabelClassificationOutput<B>>
    for FormalinClassifier<B>
{
    fn step(&self, batch: ImageBatch<B>) -> TrainOutput<MultiLabelClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<ImageBatch<B>, MultiLabelClassificationOutput<B>>
    for FormalinClassifier<B>
{
    fn step(&self, batch: ImageBatch<B>) -> MultiLabelClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 学習済みモデルの重みをバイト列に変換
pub fn encode_weights<B: Backend>(model: FormalinClassifier<B>) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    Recorder::<B>::record(&recorder, model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みのシリアライズエラー: {:?}", e))
}

/// 学習結果の要約
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub output_path: PathBuf,
    pub total_samples: usize,
    pub formalin_samples: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub num_params: usize,
}

/// モデル学習を実行
///
/// 学習データをすべてメモリに読み込み、固定エポック数だけ学習して
/// `training.output_path` に保存します（既存ファイルは上書き）。
pub fn train_model(config: &AppConfig) -> Result<TrainingReport> {
    let settings = &config.training;
    let model_config = config.model.model_config();
    let data_dir = Path::new(&settings.data_dir);
    let output_path = PathBuf::from(&settings.output_path);

    info!(data_dir = %data_dir.display(), "学習データの読み込みを開始します");
    let samples = scan_dataset(data_dir)?;
    if samples.is_empty() {
        return Err(DetectorError::TrainingIo(format!(
            "学習データが見つかりません: {}",
            data_dir.display()
        ))
        .into());
    }

    let stack = ImageStack::from_samples(&samples, model_config.image_size)?;
    let total_samples = stack.len();
    let formalin_samples = stack.positive_count();
    if formalin_samples == 0 || formalin_samples == total_samples {
        warn!(
            total_samples,
            formalin_samples, "学習データが片方のクラスしか含んでいません"
        );
    }
    info!(
        total_samples,
        formalin_samples,
        shape = ?stack.shape(),
        "学習データを積み上げました"
    );

    let (dataset_train, dataset_valid) = stack.split(settings.validation_split, settings.seed);
    let train_samples = dataset_train.len();
    let validation_samples = dataset_valid.len();
    if validation_samples == 0 {
        warn!(
            total_samples,
            validation_split = settings.validation_split,
            "検証データが0件です（検証メトリクスは記録されません）"
        );
    }
    info!(train_samples, validation_samples, "学習/検証データに分割しました");

    let device = InferenceDevice::default();
    let batcher_train = ImageBatcher::<TrainingBackend>::new(device.clone(), model_config.image_size);
    let batcher_valid =
        ImageBatcher::<crate::ml::InferenceBackend>::new(device.clone(), model_config.image_size);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(1)
        .build(dataset_train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(settings.batch_size)
        .num_workers(1)
        .build(dataset_valid);

    let model = model_config.init::<TrainingBackend>(&device)?;

    // 学習ログ用の一時ディレクトリ（ドロップ時に削除）
    let artifact_dir = tempfile::Builder::new()
        .prefix("formalin_training")
        .tempdir()
        .context("Failed to create training log directory")?;
    let artifact_dir_str = artifact_dir.path().to_string_lossy().to_string();

    info!(
        num_epochs = settings.num_epochs,
        batch_size = settings.batch_size,
        learning_rate = settings.learning_rate,
        device = ?device,
        "学習を開始します"
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(HammingScore::new().with_sigmoid(true))
        .metric_valid_numeric(HammingScore::new().with_sigmoid(true))
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    info!("学習が完了しました");

    let trained_model = model_trained.model;
    let num_params = trained_model.num_params();
    let weights = encode_weights(trained_model)?;

    let mut metadata = ModelMetadata::new(&model_config, weights.len() as u64);
    metadata.num_epochs = settings.num_epochs as u32;
    metadata.batch_size = settings.batch_size as u32;
    metadata.validation_split = settings.validation_split;
    metadata.train_samples = train_samples as u32;
    metadata.validation_samples = validation_samples as u32;

    save_artifact(&output_path, &metadata, &weights)
        .map_err(|e| DetectorError::TrainingIo(format!("{:#}", e)))?;

    Ok(TrainingReport {
        output_path,
        total_samples,
        formalin_samples,
        train_samples,
        validation_samples,
        num_params,
    })
}
