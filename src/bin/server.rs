//! 推論サーバー

use clap::Parser;
use formalin_detector::logging::init_tracing;
use formalin_detector::model::AppConfig;
use formalin_detector::server::run_server;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "formalin-server", about = "Formalin image classification server")]
struct Args {
    /// 設定ファイル（JSON）
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// モデルアーティファクト（.tar.gz）
    #[arg(long)]
    model_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config);
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model_path) = args.model_path {
        config.server.model_path = model_path;
    }
    config.validate()?;
    config.display();

    run_server(config).await
}
