pub mod dataset;
pub mod inference;
pub mod ml_model;
pub mod prediction;
pub mod preprocess;
pub mod scope;
pub mod training;

pub use dataset::{label_for_class_dir, scan_dataset, ImageItem, ImageStack, Sample, StackView};
pub use inference::{InferenceEngine, Predictor};
pub use ml_model::{FormalinClassifier, ModelConfig};
pub use prediction::{
    format_percentage, ClassLabel, ClassProbabilities, CLASS_NAMES, NEGATIVE_CLASS, POSITIVE_CLASS,
};
pub use preprocess::{
    decode_image, load_and_preprocess, preprocess_bytes, preprocess_image, ImageTensor, CHANNELS,
};
pub use scope::{Scoped, TensorScope};
pub use training::{encode_weights, train_model, TrainingReport};

/// 推論用バックエンド（`wgpu` フィーチャーでGPU）
#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu;
#[cfg(feature = "wgpu")]
pub type InferenceDevice = burn_wgpu::WgpuDevice;

/// 推論用バックエンド（CPU）
#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;
#[cfg(not(feature = "wgpu"))]
pub type InferenceDevice = burn_ndarray::NdArrayDevice;

/// 学習用バックエンド
pub type TrainingBackend = burn_autodiff::Autodiff<InferenceBackend>;
