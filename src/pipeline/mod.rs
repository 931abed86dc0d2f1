//! 分類パイプライン
//!
//! 画像選択 → 正規化 → 分類 → （確認後）保存 を状態機械として進める。
//!
//! ```text
//! Idle → ImageSelected → Normalized → Classified → Saving → Saved
//!                                               └→ Discarded
//! ```
//!
//! 失敗はすべて通知として積まれ、`reset()` でいつでも Idle に戻せる。
//! 重い処理はブロッキングスレッドで実行し、結果を反映する前に
//! 中断（`AbandonHandle::abandon`）されていないかを確認する。

mod state;

pub use state::{ClassifiedImage, Notice, Outcome, PipelineState};

use crate::classifier::ClassificationClient;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::normalizer::{self, reencode_bounded, NormalizeOptions, ReencodeOptions};
use crate::resolver::{ImageReference, ImageResolver};
use crate::store::PredictionStore;
use asclepius_common::{is_blank_result, Classification, PredictionRecord};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const IMAGE_PREFIX: &str = "cropped_image";

/// 実行中のリクエストを破棄するためのハンドル
#[derive(Debug, Clone)]
pub struct AbandonHandle {
    generation: Arc<AtomicU64>,
}

impl AbandonHandle {
    /// 実行中の正規化・分類の結果を破棄させる
    pub fn abandon(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Pipeline {
    resolver: ImageResolver,
    classifier: Arc<ClassificationClient>,
    store: PredictionStore,
    images_dir: PathBuf,
    normalize_options: NormalizeOptions,
    reencode_options: ReencodeOptions,
    state: PipelineState,
    generation: Arc<AtomicU64>,
    // 選択時点の世代。以降のステップはこの値と比べる
    request: u64,
    notices: Vec<Notice>,
}

impl Pipeline {
    pub fn new(
        resolver: ImageResolver,
        classifier: Arc<ClassificationClient>,
        store: PredictionStore,
        images_dir: impl Into<PathBuf>,
    ) -> Self {
        let normalize_options = NormalizeOptions::square(classifier.config().input_size);
        Self {
            resolver,
            classifier,
            store,
            images_dir: images_dir.into(),
            normalize_options,
            reencode_options: ReencodeOptions::default(),
            state: PipelineState::Idle,
            generation: Arc::new(AtomicU64::new(0)),
            request: 0,
            notices: Vec::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        classifier: Arc<ClassificationClient>,
        store: PredictionStore,
    ) -> Self {
        Self::new(ImageResolver::new(), classifier, store, config.images_dir()).with_reencode(
            ReencodeOptions {
                max_bytes: config.max_image_bytes,
                quality_step: config.quality_step,
            },
        )
    }

    pub fn with_reencode(mut self, options: ReencodeOptions) -> Self {
        self.reencode_options = options;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn store(&self) -> &PredictionStore {
        &self.store
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn abandon_handle(&self) -> AbandonHandle {
        AbandonHandle {
            generation: Arc::clone(&self.generation),
        }
    }

    /// 溜まった通知を取り出す
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(from = self.state.name(), to = next.name(), "pipeline transition");
        self.state = next;
    }

    fn notify_error(&mut self, error: &AppError) {
        self.notices.push(Notice::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn invalid_state(&self, action: &str) -> AppError {
        AppError::InvalidState {
            state: self.state.name().to_string(),
            action: action.to_string(),
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 選択後に中断されていたらIdleに戻してtrue
    fn discard_if_stale(&mut self, step: &str) -> bool {
        if self.current_generation() == self.request {
            return false;
        }
        tracing::info!(step, "request abandoned, discarding result");
        self.transition(PipelineState::Idle);
        true
    }

    /// 画像を選択（Noneは選択キャンセル）
    ///
    /// どの状態からでも選び直せる。選択した場合はtrue。
    pub fn select_image(&mut self, reference: Option<ImageReference>) -> bool {
        self.request = self.current_generation();
        match reference {
            Some(reference) => {
                tracing::info!(%reference, "image selected");
                self.transition(PipelineState::ImageSelected(reference));
                true
            }
            None => {
                self.notices.push(Notice::Info("No image selected".into()));
                self.transition(PipelineState::Idle);
                false
            }
        }
    }

    /// 画像を読み込んでモデル入力に正規化
    pub async fn normalize(&mut self) -> Result<Outcome<()>> {
        let PipelineState::ImageSelected(reference) = &self.state else {
            return Err(self.invalid_state("normalize"));
        };
        let reference = reference.clone();
        if self.discard_if_stale("normalize") {
            return Ok(Outcome::Stale);
        }

        let resolved = self.resolver.resolve(&reference).await;
        if self.discard_if_stale("resolve") {
            return Ok(Outcome::Stale);
        }
        let raw = match resolved {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%reference, error = %e, "image source unavailable");
                self.notify_error(&e);
                self.transition(PipelineState::Idle);
                return Err(e);
            }
        };

        tracing::debug!(
            %reference,
            encoded_bytes = raw.encoded_len,
            orientation = ?raw.exif_orientation,
            "image resolved"
        );
        let image = Arc::new(raw.image);
        let options = self.normalize_options;
        let source = Arc::clone(&image);
        let normalized =
            tokio::task::spawn_blocking(move || normalizer::normalize(&source, &options)).await;
        if self.discard_if_stale("normalize") {
            return Ok(Outcome::Stale);
        }
        let input = match normalized {
            Ok(input) => input,
            Err(e) => {
                let e = AppError::Image(format!("normalize task failed: {}", e));
                self.fail(&e);
                return Err(e);
            }
        };

        self.transition(PipelineState::Normalized {
            reference,
            image,
            input,
        });
        Ok(Outcome::Applied(()))
    }

    /// 正規化済み画像を分類
    pub async fn classify(&mut self) -> Result<Outcome<Classification>> {
        let PipelineState::Normalized {
            reference,
            image,
            input,
        } = &self.state
        else {
            return Err(self.invalid_state("classify"));
        };
        let (reference, image, input) = (reference.clone(), Arc::clone(image), input.clone());
        if self.discard_if_stale("classify") {
            return Ok(Outcome::Stale);
        }

        let classified = self.classifier.classify(input).await;
        if self.discard_if_stale("classify") {
            return Ok(Outcome::Stale);
        }

        match classified {
            Ok(classification) => {
                let result_text = classification.result_text();
                tracing::info!(%reference, result = %result_text, "image classified");
                self.transition(PipelineState::Classified(ClassifiedImage {
                    reference,
                    image,
                    classification: classification.clone(),
                    result_text,
                }));
                Ok(Outcome::Applied(classification))
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn fail(&mut self, error: &AppError) {
        tracing::error!(error = %error, "pipeline failed");
        self.notify_error(error);
        self.transition(PipelineState::Failed(error.to_string()));
    }

    /// 分類結果を保存（ユーザーの確認後に呼ぶ）
    ///
    /// 選択後に中断されたリクエストは保存せず `Outcome::Stale` を返す。
    pub async fn confirm_save(&mut self) -> Result<Outcome<PredictionRecord>> {
        if !matches!(self.state, PipelineState::Classified(_)) {
            return Err(self.invalid_state("save"));
        }
        if self.discard_if_stale("save") {
            return Ok(Outcome::Stale);
        }
        let classified = match std::mem::take(&mut self.state) {
            PipelineState::Classified(classified) => classified,
            other => {
                self.state = other;
                return Err(self.invalid_state("save"));
            }
        };
        if is_blank_result(&classified.result_text) {
            self.state = PipelineState::Classified(classified);
            let e = AppError::EmptyResult;
            self.notify_error(&e);
            return Err(e);
        }
        tracing::debug!(from = "Classified", to = "Saving", "pipeline transition");
        self.state = PipelineState::Saving;

        match self.save(classified).await {
            Ok(record) => {
                self.notices.push(Notice::Info(format!("Saved: {}", record.result)));
                self.transition(PipelineState::Saved(record.clone()));
                Ok(Outcome::Applied(record))
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn save(&self, classified: ClassifiedImage) -> Result<PredictionRecord> {
        let image = Arc::clone(&classified.image);
        let options = self.reencode_options;
        let encoded = tokio::task::spawn_blocking(move || reencode_bounded(&image, &options))
            .await
            .map_err(|e| AppError::StoreWrite(format!("re-encode task failed: {}", e)))??;
        if !encoded.within_limit {
            tracing::warn!(
                bytes = encoded.bytes.len(),
                max_bytes = options.max_bytes,
                "image still exceeds size limit at lowest quality"
            );
        }

        let id = uuid::Uuid::new_v4().to_string();
        let path = self.images_dir.join(image_file_name(&id));
        write_image(&path, &encoded.bytes).await?;

        let record = PredictionRecord::new(
            id,
            path.to_string_lossy().to_string(),
            classified.result_text,
        );
        if let Err(e) = self.store.insert(record.clone()).await {
            // 履歴に載らない画像は残さない
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %remove_err, "failed to remove orphan image");
            }
            return Err(e);
        }

        tracing::info!(
            id = %record.id,
            path = %path.display(),
            quality = encoded.quality,
            "prediction stored"
        );
        Ok(record)
    }

    /// 分類結果を保存せずに破棄
    pub fn discard(&mut self) -> Result<()> {
        if !matches!(self.state, PipelineState::Classified(_)) {
            return Err(self.invalid_state("discard"));
        }
        self.transition(PipelineState::Discarded);
        Ok(())
    }

    /// Idleに戻す
    pub fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.transition(PipelineState::Idle);
    }

    /// 選択から保存（または破棄）までを一度に実行
    ///
    /// `confirm` は分類結果を受け取り、保存するならtrueを返す。
    pub async fn run<F>(&mut self, reference: ImageReference, confirm: F) -> Result<Outcome<PipelineState>>
    where
        F: FnOnce(&ClassifiedImage) -> bool,
    {
        if !self.state.is_idle() {
            self.reset();
        }
        self.select_image(Some(reference));

        if self.normalize().await?.is_stale() {
            return Ok(Outcome::Stale);
        }
        if self.classify().await?.is_stale() {
            return Ok(Outcome::Stale);
        }

        let save = match &self.state {
            PipelineState::Classified(classified) => confirm(classified),
            _ => false,
        };
        if save {
            if self.confirm_save().await?.is_stale() {
                return Ok(Outcome::Stale);
            }
        } else {
            self.discard()?;
        }
        Ok(Outcome::Applied(self.state.clone()))
    }
}

fn image_file_name(id: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let short: String = id.chars().filter(|c| *c != '-').take(8).collect();
    format!("{}_{}_{}.jpg", IMAGE_PREFIX, millis, short)
}

async fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    let copy_error =
        |e: std::io::Error| AppError::StoreWrite(format!("image copy {}: {}", path.display(), e));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(copy_error)?;
    }
    tokio::fs::write(path, bytes).await.map_err(copy_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_file_name() {
        let name = image_file_name("1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        assert!(name.starts_with("cropped_image_"));
        assert!(name.ends_with("_1b4e28ba.jpg"));
    }
}
