//! ログ初期化

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` を読み、未設定なら `info` でログを初期化
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 二重初期化（テストなど）は無視する
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
