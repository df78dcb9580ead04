//! 学習データの読み込み
//!
//! `<root>/<class>/*.{jpg,png}` を走査し、全画像を前処理して1つのバッチとしてメモリに積みます。

use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DetectorError, Result};
use crate::ml::{load_and_preprocess, CHANNELS, POSITIVE_CLASS};

/// 学習サンプル（画像パスとラベル）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: u8,
}

/// クラスフォルダ名からラベルを決める
///
/// `formalin`（大文字小文字は無視）なら 1、それ以外はすべて 0。
/// フォルダが3つ以上あっても2クラス問題として扱います。
pub fn label_for_class_dir(name: &str) -> u8 {
    u8::from(name.eq_ignore_ascii_case(POSITIVE_CLASS))
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "jpg" || ext == "png"
        })
        .unwrap_or(false)
}

fn io_error(path: &Path, e: std::io::Error) -> DetectorError {
    DetectorError::TrainingIo(format!("{}: {}", path.display(), e))
}

/// 学習データディレクトリを走査
///
/// 直下のサブフォルダのみをクラスとして扱い、ファイルは無視します。
/// 結果はパス順に並べます。
pub fn scan_dataset(root: &Path) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();

    for entry in std::fs::read_dir(root).map_err(|e| io_error(root, e))? {
        let class_dir = entry.map_err(|e| io_error(root, e))?.path();
        if !class_dir.is_dir() {
            continue;
        }

        let class_name = class_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = label_for_class_dir(&class_name);

        let mut count = 0usize;
        for img_entry in std::fs::read_dir(&class_dir).map_err(|e| io_error(&class_dir, e))? {
            let path = img_entry.map_err(|e| io_error(&class_dir, e))?.path();
            if path.is_file() && is_supported_image(&path) {
                samples.push(Sample { path, label });
                count += 1;
            }
        }

        info!(class = %class_name, label, samples = count, "クラスフォルダを読み込みました");
    }

    samples.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(samples)
}

/// 1サンプル分のデータ
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// [size, size, 3] を平坦化したもの
    pub pixels: Vec<f32>,
    pub label: u8,
}

/// 前処理済みの全画像を積んだ密なバッチ [N, size, size, 3]
#[derive(Debug)]
pub struct ImageStack {
    pixels: Vec<f32>,
    labels: Vec<u8>,
    image_size: usize,
}

impl ImageStack {
    /// すべてのサンプルを前処理して積む
    ///
    /// 1枚でも読めない画像があれば学習全体を失敗させます。
    pub fn from_samples(samples: &[Sample], image_size: usize) -> Result<Self> {
        let item_len = image_size * image_size * CHANNELS;
        let mut pixels = Vec::with_capacity(samples.len() * item_len);
        let mut labels = Vec::with_capacity(samples.len());

        for sample in samples {
            let tensor = load_and_preprocess(&sample.path, image_size)?;
            pixels.extend_from_slice(tensor.as_slice());
            labels.push(sample.label);
        }

        debug!(
            samples = labels.len(),
            bytes = pixels.len() * std::mem::size_of::<f32>(),
            "学習データをメモリに展開しました"
        );

        Ok(Self {
            pixels,
            labels,
            image_size,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// [N, size, size, 3]
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), self.image_size, self.image_size, CHANNELS]
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// ラベル1（formalin）のサンプル数
    pub fn positive_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    pub fn item(&self, index: usize) -> Option<ImageItem> {
        let label = *self.labels.get(index)?;
        let item_len = self.image_size * self.image_size * CHANNELS;
        let start = index * item_len;
        Some(ImageItem {
            pixels: self.pixels[start..start + item_len].to_vec(),
            label,
        })
    }

    /// シード付きでシャッフルし、末尾 `validation_split` の割合を検証用に分ける
    pub fn split(self, validation_split: f32, seed: u64) -> (StackView, StackView) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let total_len = indices.len();
        let valid_len = ((total_len as f32) * validation_split).round() as usize;
        let train_len = total_len - valid_len.min(total_len);

        let stack = Arc::new(self);
        let valid_indices = indices.split_off(train_len);

        (
            StackView {
                stack: Arc::clone(&stack),
                indices,
            },
            StackView {
                stack,
                indices: valid_indices,
            },
        )
    }
}

/// `ImageStack` の一部を参照するデータセット
#[derive(Debug, Clone)]
pub struct StackView {
    stack: Arc<ImageStack>,
    indices: Vec<usize>,
}

impl StackView {
    pub fn image_size(&self) -> usize {
        self.stack.image_size()
    }
}

impl Dataset<ImageItem> for StackView {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.stack.item(*self.indices.get(index)?)
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}
