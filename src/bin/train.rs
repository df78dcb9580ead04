//! モデル学習

use clap::Parser;
use formalin_detector::logging::init_tracing;
use formalin_detector::ml::train_model;
use formalin_detector::model::AppConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "formalin-train", about = "Train the formalin image classifier")]
struct Args {
    /// 設定ファイル（JSON）
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// 学習データ（`<dir>/<class>/*.jpg|png`）
    #[arg(long)]
    data_dir: Option<String>,

    /// 出力先（.tar.gz）
    #[arg(long)]
    output: Option<String>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    image_size: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config);
    config.apply_env_overrides();
    if let Some(data_dir) = args.data_dir {
        config.training.data_dir = data_dir;
    }
    if let Some(output) = args.output {
        config.training.output_path = output;
    }
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(image_size) = args.image_size {
        config.model.image_size = image_size;
    }
    config.validate()?;
    config.display();

    let report = train_model(&config)?;
    info!(
        output = %report.output_path.display(),
        total_samples = report.total_samples,
        formalin_samples = report.formalin_samples,
        train_samples = report.train_samples,
        validation_samples = report.validation_samples,
        num_params = report.num_params,
        "モデルを保存しました"
    );
    Ok(())
}
