//! 予測履歴ストア
//!
//! 保存済みの予測をJSONファイルに永続化する。全操作は1つのロックで直列化され、
//! 書き込みは一時ファイル + rename で行う。書き込みに失敗した場合はメモリ上の
//! 状態も元に戻す。

use crate::error::{AppError, Result};
use asclepius_common::{is_blank_result, PredictionRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 履歴ファイルの構造
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    /// バージョン（互換性チェック用）
    version: u32,
    records: Vec<PredictionRecord>,
}

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    version: u32,
    records: &'a [PredictionRecord],
}

impl HistoryFile {
    const CURRENT_VERSION: u32 = 1;
}

#[derive(Debug)]
struct StoreInner {
    /// Noneならメモリのみ
    path: Option<PathBuf>,
    records: Vec<PredictionRecord>,
}

/// 予測履歴ストア（クローンしても同じ履歴を共有する）
#[derive(Debug, Clone)]
pub struct PredictionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl PredictionStore {
    /// 履歴ファイルを開く（存在しなければ空で開始）
    ///
    /// 同じファイルへのハンドルは1つだけ開き、共有はクローンで行うこと。
    /// 別々に開いたハンドル同士はロックを共有しないため、後から書いた側が
    /// もう一方の変更を上書きする。
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path).await?;
        tracing::debug!(path = %path.display(), records = records.len(), "prediction store opened");

        Ok(Self::with_inner(StoreInner {
            path: Some(path),
            records,
        }))
    }

    /// 永続化しないストア
    pub fn in_memory() -> Self {
        Self::with_inner(StoreInner {
            path: None,
            records: Vec::new(),
        })
    }

    fn with_inner(inner: StoreInner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// 保存先（メモリのみならNone）
    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }

    /// 予測を保存（同じIDがあれば置き換えて末尾へ）
    pub async fn insert(&self, record: PredictionRecord) -> Result<()> {
        if is_blank_result(&record.result) {
            return Err(AppError::EmptyResult);
        }
        record
            .validate()
            .map_err(|e| AppError::StoreWrite(e.to_string()))?;

        let mut inner = self.inner.lock().await;
        let previous = inner.records.clone();

        inner.records.retain(|r| r.id != record.id);
        let id = record.id.clone();
        inner.records.push(record);

        if let Err(e) = persist(&inner).await {
            inner.records = previous;
            return Err(e);
        }
        tracing::info!(%id, total = inner.records.len(), "prediction saved");
        Ok(())
    }

    /// 全件のスナップショット（保存順）
    pub async fn list_all(&self) -> Vec<PredictionRecord> {
        self.inner.lock().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &str) -> Option<PredictionRecord> {
        self.inner
            .lock()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// 予測を削除（存在しなければ何もしない）
    pub async fn delete(&self, record: &PredictionRecord) -> Result<bool> {
        self.delete_by_id(&record.id).await
    }

    /// IDで削除。削除した場合はtrue
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };

        let removed = inner.records.remove(index);
        if let Err(e) = persist(&inner).await {
            inner.records.insert(index, removed);
            return Err(e);
        }
        tracing::info!(%id, "prediction deleted");
        Ok(true)
    }
}

async fn load_records(path: &Path) -> Result<Vec<PredictionRecord>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::StoreRead(format!("{}: {}", path.display(), e)))?;
    let file: HistoryFile = serde_json::from_slice(&content)
        .map_err(|e| AppError::StoreRead(format!("{}: {}", path.display(), e)))?;

    if file.version != HistoryFile::CURRENT_VERSION {
        return Err(AppError::StoreRead(format!(
            "{}: unsupported history version {}",
            path.display(),
            file.version
        )));
    }
    Ok(file.records)
}

async fn persist(inner: &StoreInner) -> Result<()> {
    let Some(path) = inner.path.as_ref() else {
        return Ok(());
    };
    let body = serde_json::to_vec_pretty(&HistoryFileRef {
        version: HistoryFile::CURRENT_VERSION,
        records: &inner.records,
    })
    .map_err(|e| write_error(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(path, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &body)
        .await
        .map_err(|e| write_error(path, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(path, e));
    }
    Ok(())
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::StoreWrite(format!("{}: {}", path.display(), e))
}
