//! Asclepius: 皮膚病変写真の分類パイプライン
//!
//! 画像取得 → 正規化 → 分類 → （確認後）履歴保存

pub mod cli;
pub mod config;
pub mod error;
pub mod resolver;
pub mod normalizer;
pub mod classifier;
pub mod store;
pub mod pipeline;
pub mod scanner;
pub mod news;

pub use asclepius_common::{Category, Classification, Orientation, PredictionRecord};
