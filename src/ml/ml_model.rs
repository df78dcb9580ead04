//! 機械学習モデルの共通定義
//!
//! ホルマリン判定用のCNNモデルと関連する設定を提供します。

use anyhow::Result;
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::BinaryCrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Int, Tensor},
    train::MultiLabelClassificationOutput,
};
use tracing::debug;

/// 畳み込み各段のフィルタ数
pub const CONV_FILTERS: [usize; 3] = [64, 128, 256];

/// 全結合層のユニット数
pub const HIDDEN_UNITS: usize = 256;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 入力画像サイズ（正方形）
    #[config(default = 224)]
    pub image_size: usize,
    /// 入力層のリスケール係数
    #[config(default = 1.0)]
    pub rescale: f64,
}

impl ModelConfig {
    /// 3段の {Conv 3x3 (no padding) + MaxPool 2x2} 後の特徴マップサイズ
    ///
    /// 入力が小さすぎて特徴マップが消える場合は `None`。
    pub fn feature_map_size(&self) -> Option<usize> {
        let mut size = self.image_size;
        for _ in 0..CONV_FILTERS.len() {
            if size < 3 {
                return None;
            }
            size = (size - 2) / 2;
        }
        (size > 0).then_some(size)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<FormalinClassifier<B>> {
        let feature_map_size = self.feature_map_size().ok_or_else(|| {
            anyhow::anyhow!(
                "入力サイズが小さすぎます: {} (最小22x22が必要)",
                self.image_size
            )
        })?;

        // 特徴次元 d = 256チャネル * feature_map_size * feature_map_size
        let d = CONV_FILTERS[2] * feature_map_size * feature_map_size;
        debug!(
            image_size = self.image_size,
            feature_map_size,
            flatten_dim = d,
            "モデル構成"
        );

        let pool = || MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Ok(FormalinClassifier {
            conv1: Conv2dConfig::new([3, CONV_FILTERS[0]], [3, 3]).init(device),
            pool1: pool(),
            conv2: Conv2dConfig::new([CONV_FILTERS[0], CONV_FILTERS[1]], [3, 3]).init(device),
            pool2: pool(),
            conv3: Conv2dConfig::new([CONV_FILTERS[1], CONV_FILTERS[2]], [3, 3]).init(device),
            pool3: pool(),
            fc1: LinearConfig::new(d, HIDDEN_UNITS).init(device),
            output: LinearConfig::new(HIDDEN_UNITS, 1).init(device),
            activation: Relu::new(),
            rescale: self.rescale,
        })
    }
}

/// ホルマリン判定用CNNモデル
///
/// # アーキテクチャ
/// - Rescaling
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 3層 (64 -> 128 -> 256)
/// - Flatten
/// - FC: d -> 256 + ReLU
/// - FC: 256 -> 1 (Sigmoidで P(formalin))
///
/// 入力は `[batch, height, width, 3]`（チャネル最後）です。
#[derive(Module, Debug)]
pub struct FormalinClassifier<B: Backend> {
    conv1: Conv2d<B>,
    pool1: MaxPool2d,
    conv2: Conv2d<B>,
    pool2: MaxPool2d,
    conv3: Conv2d<B>,
    pool3: MaxPool2d,

    fc1: Linear<B>,
    output: Linear<B>,

    activation: Relu,
    rescale: f64,
}

impl<B: Backend> FormalinClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, size, size, 3]
    ///
    /// # 戻り値
    /// - ロジット [batch_size, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // NHWC -> NCHW
        let x = images.permute([0, 3, 1, 2]).mul_scalar(self.rescale);

        let x = self.pool1.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool2.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool3.forward(self.activation.forward(self.conv3.forward(x)));

        let [batch_size, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.activation.forward(self.fc1.forward(x));
        self.output.forward(x)
    }

    /// Sigmoid出力 [batch_size, 1]
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, size, size, 3]
    /// - `targets`: ラベル [batch_size, 1]（1 = formalin）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 2, Int>,
    ) -> MultiLabelClassificationOutput<B> {
        let output = self.forward(images);
        let loss = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        MultiLabelClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_feature_map_size() {
        assert_eq!(ModelConfig::new().feature_map_size(), Some(26));
        assert_eq!(ModelConfig::new().with_image_size(256).feature_map_size(), Some(30));
        assert_eq!(ModelConfig::new().with_image_size(22).feature_map_size(), Some(1));
        assert_eq!(ModelConfig::new().with_image_size(21).feature_map_size(), None);
    }

    #[test]
    fn test_init_rejects_small_input() {
        let device = Default::default();
        let result = ModelConfig::new().with_image_size(16).init::<TestBackend>(&device);
        assert!(result.is_err());
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model = ModelConfig::new()
            .with_image_size(32)
            .init::<TestBackend>(&device)
            .unwrap();

        let images = Tensor::<TestBackend, 4>::zeros([2, 32, 32, 3], &device);
        assert_eq!(model.forward(images.clone()).dims(), [2, 1]);

        let probs = model
            .predict(images)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_forward_classification_loss_is_finite() {
        let device = Default::default();
        let model = ModelConfig::new()
            .with_image_size(32)
            .init::<TestBackend>(&device)
            .unwrap();

        let images = Tensor::<TestBackend, 4>::ones([2, 32, 32, 3], &device).mul_scalar(0.5);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, 0], &device).reshape([2, 1]);

        let output = model.forward_classification(images, targets);
        let loss = output.loss.into_data().to_vec::<f32>().unwrap();
        assert_eq!(loss.len(), 1);
        assert!(loss[0].is_finite());
    }
}
