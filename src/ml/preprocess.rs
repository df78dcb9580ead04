//! 画像の前処理
//!
//! デコード → アルファチャネル除去 → 最近傍リサイズ → [0, 1] 正規化 の順で、
//! モデル入力用の (height, width, channel) テンソルを作ります。

use burn::tensor::{backend::Backend, Tensor};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

use crate::error::{DetectorError, Result};

/// モデル入力のチャネル数
pub const CHANNELS: usize = 3;

/// 正規化済みの画像データ（HWC順で平坦化）
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// [height, width, channel]
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, CHANNELS]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// バッチ次元を先頭に追加したテンソル [1, height, width, 3]
    pub fn to_batch<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::<B, 1>::from_floats(self.data.as_slice(), device)
            .reshape([1, self.height, self.width, CHANNELS])
    }
}

/// バイト列を画像としてデコード（JPEG/PNGなど）
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| DetectorError::Decode(e.to_string()))
}

/// デコード済み画像をモデル入力に変換
///
/// アルファチャネルは捨てて先頭3チャネルのみ使います。
pub fn preprocess_image(image: &DynamicImage, size: usize) -> ImageTensor {
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, size as u32, size as u32, FilterType::Nearest);

    let data = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    ImageTensor {
        data,
        height: size,
        width: size,
    }
}

/// バイト列からモデル入力を作成（バッチ次元なし）
pub fn preprocess_bytes(bytes: &[u8], size: usize) -> Result<ImageTensor> {
    let image = decode_image(bytes)?;
    Ok(preprocess_image(&image, size))
}

/// 画像ファイルを読み込んでモデル入力を作成（学習用）
pub fn load_and_preprocess(path: &Path, size: usize) -> Result<ImageTensor> {
    let bytes = std::fs::read(path).map_err(|e| {
        DetectorError::TrainingIo(format!("画像の読み込みに失敗しました {}: {}", path.display(), e))
    })?;
    preprocess_bytes(&bytes, size).map_err(|e| {
        DetectorError::TrainingIo(format!("{}: {}", path.display(), e))
    })
}
