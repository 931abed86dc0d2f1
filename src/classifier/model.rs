//! 推論バックエンドの境界
//!
//! 分類器本体（TFLite等）は不透明な能力として扱い、ここで定義する
//! 2つのトレイトだけでクライアントと接続する。

use crate::error::{AppError, Result};
use crate::normalizer::NormalizedImage;
use asclepius_common::Category;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// ロード済みモデル
pub trait Model: Send + Sync {
    /// 生スコアを返す（閾値・並べ替え・件数制限はクライアント側で行う）
    fn infer(&self, image: &NormalizedImage) -> Result<Vec<Category>>;
}

/// モデルファイルのロード
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Model>>;
}

/// 推論バックエンドなしでビルドされた場合のローダー
#[derive(Debug, Default)]
pub struct UnsupportedLoader;

impl ModelLoader for UnsupportedLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Model>> {
        Err(AppError::ModelLoad(format!(
            "{}: built without tflite support (rebuild with --features tflite)",
            path.display()
        )))
    }
}

/// ビルド構成に応じたデフォルトローダー
#[cfg(feature = "tflite")]
pub fn default_loader(labels: Option<PathBuf>, input_size: u32) -> Arc<dyn ModelLoader> {
    Arc::new(super::tflite::TfliteLoader::new(labels, input_size))
}

/// ビルド構成に応じたデフォルトローダー
#[cfg(not(feature = "tflite"))]
pub fn default_loader(labels: Option<PathBuf>, input_size: u32) -> Arc<dyn ModelLoader> {
    let _ = (labels, input_size);
    Arc::new(UnsupportedLoader)
}

/// ラベルファイルを読み込み（1行1ラベル、空行は無視）
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::ModelLoad(format!("labels {}: {}", path.display(), e)))?;

    Ok(content
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// スコア列にラベルを付与（ラベル不足分は "class_<index>"）
pub fn label_scores(scores: &[f32], labels: &[String]) -> Vec<Category> {
    scores
        .iter()
        .enumerate()
        .map(|(i, &score)| {
            let label = labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", i));
            Category::new(label, score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_labels_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "Cancer\n\n  Non Cancer  \n").unwrap();

        let labels = load_labels(&path).unwrap();
        assert_eq!(labels, vec!["Cancer", "Non Cancer"]);
    }

    #[test]
    fn test_load_labels_missing_file() {
        let err = load_labels(Path::new("/nonexistent/labels.txt")).unwrap_err();
        assert!(matches!(err, AppError::ModelLoad(_)));
    }

    #[test]
    fn test_label_scores() {
        let labels = vec!["Cancer".to_string()];
        let categories = label_scores(&[0.8, 0.2], &labels);
        assert_eq!(categories[0], Category::new("Cancer", 0.8));
        assert_eq!(categories[1], Category::new("class_1", 0.2));
    }

    #[test]
    fn test_unsupported_loader() {
        let err = UnsupportedLoader
            .load(Path::new("model.tflite"))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ModelLoad(_)));
        assert!(err.to_string().contains("tflite"));
    }
}
