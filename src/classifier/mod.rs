//! 分類クライアント
//!
//! 同梱モデルを書き込み可能ディレクトリへコピーしてロードし、
//! 正規化済み画像を分類する。モデルハンドルは遅延ロードして全呼び出しで共有する。
//!
//! 状態遷移: Unloaded → Loading → Ready / Loading → Failed → (次回の分類で) Loading

mod model;
#[cfg(feature = "tflite")]
mod tflite;

pub use model::{default_loader, label_scores, load_labels, Model, ModelLoader, UnsupportedLoader};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::normalizer::NormalizedImage;
use asclepius_common::{Classification, Orientation};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// 分類クライアント設定
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub threshold: f32,
    pub max_results: usize,
    pub orientation: Orientation,
    pub input_size: u32,
    pub model_asset: String,
    pub asset_dir: PathBuf,
    /// ロード前にモデルをコピーする先
    pub model_dir: PathBuf,
}

impl ClassifierConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.threshold,
            max_results: config.max_results,
            orientation: config.orientation,
            input_size: config.input_size,
            model_asset: config.model_asset.clone(),
            asset_dir: config.asset_dir.clone(),
            model_dir: config.model_dir(),
        }
    }
}

/// モデルハンドルの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

pub struct ClassificationClient {
    config: ClassifierConfig,
    loader: Arc<dyn ModelLoader>,
    /// ロードはこのロックの内側でのみ行う（同時ロードは1つまで）
    slot: tokio::sync::Mutex<Option<Arc<dyn Model>>>,
    state: Mutex<ModelState>,
}

impl ClassificationClient {
    pub fn new(config: ClassifierConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            config,
            loader,
            slot: tokio::sync::Mutex::new(None),
            state: Mutex::new(ModelState::Unloaded),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn state(&self) -> ModelState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: ModelState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// モデルをロード（ロード済みならそのまま返す）
    pub async fn load_model(&self) -> Result<Arc<dyn Model>> {
        let mut slot = self.slot.lock().await;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        self.load_into(&mut slot).await
    }

    /// ロード済みモデルを破棄して再ロード
    pub async fn reload(&self) -> Result<Arc<dyn Model>> {
        let mut slot = self.slot.lock().await;
        *slot = None;
        self.load_into(&mut slot).await
    }

    async fn load_into(&self, slot: &mut Option<Arc<dyn Model>>) -> Result<Arc<dyn Model>> {
        self.set_state(ModelState::Loading);

        let asset = self.config.asset_dir.join(&self.config.model_asset);
        let model_dir = self.config.model_dir.clone();
        let loader = Arc::clone(&self.loader);

        let started = Instant::now();
        let loaded = tokio::task::spawn_blocking(move || {
            let path = stage_model(&asset, &model_dir)?;
            loader.load(&path)
        })
        .await
        .map_err(|e| AppError::ModelLoad(format!("load task failed: {}", e)))
        .and_then(|r| r);

        match loaded {
            Ok(model) => {
                tracing::info!(
                    asset = %self.config.model_asset,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "classifier model loaded"
                );
                *slot = Some(Arc::clone(&model));
                self.set_state(ModelState::Ready);
                Ok(model)
            }
            Err(e) => {
                tracing::error!(error = %e, "classifier model load failed");
                self.set_state(ModelState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// 正規化済み画像を分類
    pub async fn classify(&self, image: NormalizedImage) -> Result<Classification> {
        let size = self.config.input_size;
        if !image.is_well_formed() || image.width() != size || image.height() != size {
            return Err(AppError::Inference(format!(
                "expected {}x{}x3 buffer, got {}x{} with {} bytes",
                size,
                size,
                image.width(),
                image.height(),
                image.data().len()
            )));
        }

        let model = self.load_model().await?;

        let oriented = image
            .oriented(self.config.orientation)
            .ok_or_else(|| AppError::Inference("cannot apply orientation".into()))?;

        let started = Instant::now();
        let scores = tokio::task::spawn_blocking(move || model.infer(&oriented))
            .await
            .map_err(|e| AppError::Inference(format!("inference task failed: {}", e)))??;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            candidates = scores.len(),
            "inference finished"
        );

        Ok(Classification::from_scores(
            scores,
            self.config.threshold,
            self.config.max_results,
        ))
    }
}

/// 同梱モデルを書き込み可能ディレクトリへコピー
fn stage_model(asset: &Path, model_dir: &Path) -> Result<PathBuf> {
    if !asset.is_file() {
        return Err(AppError::ModelLoad(format!(
            "model asset not found: {}",
            asset.display()
        )));
    }

    let file_name = asset
        .file_name()
        .ok_or_else(|| AppError::ModelLoad(format!("invalid asset path: {}", asset.display())))?;
    std::fs::create_dir_all(model_dir)
        .map_err(|e| AppError::ModelLoad(format!("{}: {}", model_dir.display(), e)))?;

    let dest = model_dir.join(file_name);
    let same_file = match (asset.canonicalize(), dest.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same_file {
        std::fs::copy(asset, &dest)
            .map_err(|e| AppError::ModelLoad(format!("copy {}: {}", asset.display(), e)))?;
    }

    Ok(dest)
}
