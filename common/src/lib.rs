//! Asclepius Common Library
//!
//! 分類パイプラインとCLIで共有される型とユーティリティ

pub mod types;
pub mod format;
pub mod diff;
pub mod error;

pub use types::{Category, Classification, Orientation, PredictionRecord};
pub use format::{format_confidence, format_result, is_blank_result};
pub use diff::{diff, Edit, Keyed, Patch};
pub use error::{Error, Result};
