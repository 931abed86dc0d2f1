use crate::error::{AppError, Result};
use asclepius_common::Orientation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MODEL_ASSET: &str = "cancer_classification.tflite";
pub const DEFAULT_NEWS_BASE_URL: &str = "https://newsapi.org/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同梱モデルのファイル名
    pub model_asset: String,
    /// 同梱アセットのディレクトリ
    pub asset_dir: PathBuf,
    /// ラベルファイル（1行1ラベル、asset_dirからの相対可）
    pub labels: Option<PathBuf>,
    pub threshold: f32,
    pub max_results: usize,
    /// モデル入力の一辺（px）
    pub input_size: u32,
    pub orientation: Orientation,
    /// 履歴・保存画像の置き場所
    pub data_dir: PathBuf,
    /// 保存画像の最大バイト数
    pub max_image_bytes: usize,
    /// JPEG品質の下げ幅
    pub quality_step: u8,
    pub news_base_url: String,
    pub news_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_asset: DEFAULT_MODEL_ASSET.into(),
            asset_dir: PathBuf::from("assets"),
            labels: None,
            threshold: 0.1,
            max_results: 3,
            input_size: 224,
            orientation: Orientation::Identity,
            data_dir: default_data_dir(),
            max_image_bytes: 1_000_000,
            quality_step: 5,
            news_base_url: DEFAULT_NEWS_BASE_URL.into(),
            news_api_key: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("config directory not found".into()))?;
        Ok(dir.join("asclepius").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(AppError::Config(format!(
                "threshold must be within 0.0-1.0: {}",
                self.threshold
            )));
        }
        if self.max_results == 0 {
            return Err(AppError::Config("max_results must be at least 1".into()));
        }
        if self.input_size == 0 {
            return Err(AppError::Config("input_size must be positive".into()));
        }
        if self.quality_step == 0 {
            return Err(AppError::Config("quality_step must be positive".into()));
        }
        Ok(())
    }

    /// モデルをコピーする書き込み可能ディレクトリ
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// 保存画像ディレクトリ
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    /// 履歴ファイル
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn labels_path(&self) -> Option<PathBuf> {
        self.labels.as_ref().map(|p| {
            if p.is_relative() {
                self.asset_dir.join(p)
            } else {
                p.clone()
            }
        })
    }

    pub fn get_news_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var("NEWS_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.news_api_key.clone().ok_or(AppError::MissingApiKey)
    }

    pub fn set_news_api_key(&mut self, key: String) -> Result<()> {
        self.news_api_key = Some(key);
        self.save()
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("asclepius")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model_asset, "cancer_classification.tflite");
        assert_eq!(config.threshold, 0.1);
        assert_eq!(config.max_results, 3);
        assert_eq!(config.input_size, 224);
        assert_eq!(config.max_image_bytes, 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"threshold": 0.5, "orientation": "rotate90"}"#).unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.orientation, Orientation::Rotate90);
        assert_eq!(config.max_results, 3);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = Config {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_derived_paths() {
        let config = Config {
            data_dir: PathBuf::from("/data"),
            asset_dir: PathBuf::from("/assets"),
            labels: Some(PathBuf::from("labels.txt")),
            ..Default::default()
        };
        assert_eq!(config.history_path(), PathBuf::from("/data/history.json"));
        assert_eq!(config.images_dir(), PathBuf::from("/data/images"));
        assert_eq!(config.model_dir(), PathBuf::from("/data/models"));
        assert_eq!(config.labels_path(), Some(PathBuf::from("/assets/labels.txt")));
    }
}
