//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（入力サイズ、クラスラベルなど）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use tracing::info;

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const WEIGHTS_ENTRY: &str = "model.bin";

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 同じディレクトリの一時ファイルに書き出してから置き換えるため、
/// 既存のアーティファクトは常に上書きされ、書きかけの状態は残りません。
pub fn save_artifact(output_path: &Path, metadata: &ModelMetadata, weights: &[u8]) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    let temp_path = temp_path_for(output_path);
    write_archive(&temp_path, metadata, weights).inspect_err(|_| {
        std::fs::remove_file(&temp_path).ok();
    })?;

    std::fs::rename(&temp_path, output_path).with_context(|| {
        format!(
            "Failed to move {} to {}",
            temp_path.display(),
            output_path.display()
        )
    })?;

    info!(
        path = %output_path.display(),
        weights_mb = %format!("{:.2}", weights.len() as f64 / 1024.0 / 1024.0),
        "モデルを保存しました"
    );
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "model".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_archive(path: &Path, metadata: &ModelMetadata, weights: &[u8]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create tar.gz file: {}", path.display()))?;

    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let json = metadata.to_json_string()?;
    append_entry(&mut builder, METADATA_ENTRY, json.as_bytes())?;
    append_entry(&mut builder, WEIGHTS_ENTRY, weights)?;

    let encoder = builder
        .into_inner()
        .context("Failed to finalize tar archive")?;
    let file = encoder.finish().context("Failed to finish gzip stream")?;
    file.sync_all().context("Failed to flush model file")?;
    Ok(())
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// Tar.gzの中身（読み込んだエントリのみ）
#[derive(Default)]
struct ArchiveEntries {
    metadata: Option<ModelMetadata>,
    weights: Option<Vec<u8>>,
}

fn read_entries(tar_gz_path: &Path, with_weights: bool) -> Result<ArchiveEntries> {
    let file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {}", tar_gz_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut entries = ArchiveEntries::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();

        match path.as_str() {
            METADATA_ENTRY => {
                let mut json = String::new();
                entry.read_to_string(&mut json)?;
                entries.metadata = Some(ModelMetadata::from_json_string(&json)?);
                if !with_weights {
                    break;
                }
            }
            WEIGHTS_ENTRY if with_weights => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                entries.weights = Some(buffer);
            }
            _ => {}
        }
    }

    Ok(entries)
}

/// Tar.gzからモデルメタデータのみを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    read_entries(tar_gz_path, false)?
        .metadata
        .ok_or_else(|| anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
///
/// 重みのバイト数がメタデータの記録と一致しない場合はエラーになります。
pub fn load_artifact(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let entries = read_entries(tar_gz_path, true)?;

    let (metadata, weights) = match (entries.metadata, entries.weights) {
        (Some(metadata), Some(weights)) => (metadata, weights),
        (None, _) => anyhow::bail!("metadata.json not found in tar.gz archive"),
        (_, None) => anyhow::bail!("model.bin not found in tar.gz archive"),
    };

    if weights.len() as u64 != metadata.weights_bytes {
        anyhow::bail!(
            "model.bin is {} bytes but metadata records {} bytes",
            weights.len(),
            metadata.weights_bytes
        );
    }

    Ok((metadata, weights))
}

/// メタデータをログに出力
pub fn log_metadata_info(metadata: &ModelMetadata) {
    info!(
        format_version = metadata.format_version,
        class_labels = %metadata.class_labels.join(", "),
        image_size = metadata.image_size,
        rescale = metadata.rescale,
        num_epochs = metadata.num_epochs,
        batch_size = metadata.batch_size,
        train_samples = metadata.train_samples,
        validation_samples = metadata.validation_samples,
        trained_at = %metadata.trained_at,
        "モデルメタデータ"
    );
}
