//! ホルマリン判定（画像の2クラス分類）
//!
//! - `ml`: 前処理・CNN・推論・学習
//! - `model`: 設定とモデルアーティファクト（metadata.json + model.bin）
//! - `server`: HTTP推論サーバー

pub mod error;
pub mod logging;
pub mod ml;
pub mod model;
pub mod server;

pub use error::{DetectorError, Result};
