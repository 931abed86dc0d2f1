//! 分類結果・履歴レコードの型定義
//!
//! パイプラインとCLIで共有される型:
//! - Category: ラベル1件と信頼度
//! - Classification: 閾値・件数で絞り込み済みのランキング
//! - PredictionRecord: 履歴ストアに保存される1件
//! - Orientation: 推論前に適用する回転

use crate::error::{Error, Result};
use crate::format::{format_result, is_blank_result};
use serde::{Deserialize, Serialize};

/// 分類ラベル1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    /// 0.0 - 1.0
    pub confidence: f32,
}

impl Category {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// 分類結果（信頼度の降順、閾値以上、最大件数以内）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classification {
    categories: Vec<Category>,
}

impl Classification {
    /// モデルの生スコアから分類結果を構築
    ///
    /// 閾値未満（NaN含む）を除外し、降順に並べて `max_results` 件に切り詰める。
    /// 同点は入力順を保つ。
    pub fn from_scores(scores: Vec<Category>, threshold: f32, max_results: usize) -> Self {
        let mut categories: Vec<Category> = scores
            .into_iter()
            .filter(|c| c.confidence >= threshold)
            .collect();
        categories.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        categories.truncate(max_results);
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn top(&self) -> Option<&Category> {
        self.categories.first()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// 画面表示・保存用の結果文字列（先頭ラベル）。該当なしは空文字
    pub fn result_text(&self) -> String {
        self.top()
            .map(|c| format_result(&c.label, c.confidence))
            .unwrap_or_default()
    }
}

/// 推論前の回転
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// EXIF Orientation タグ値から変換（反転系は回転成分のみ採用）
    pub fn from_exif(value: u32) -> Self {
        match value {
            3 | 4 => Orientation::Rotate180,
            5 | 6 => Orientation::Rotate90,
            7 | 8 => Orientation::Rotate270,
            _ => Orientation::Identity,
        }
    }

    /// 時計回りの回転角
    pub fn degrees(&self) -> u16 {
        match self {
            Orientation::Identity => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }
}

impl std::str::FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "identity" | "0" | "none" => Ok(Orientation::Identity),
            "rotate90" | "90" => Ok(Orientation::Rotate90),
            "rotate180" | "180" => Ok(Orientation::Rotate180),
            "rotate270" | "270" => Ok(Orientation::Rotate270),
            _ => Err(Error::Config(format!("unknown orientation: {}", s))),
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Identity => write!(f, "identity"),
            Orientation::Rotate90 => write!(f, "rotate90"),
            Orientation::Rotate180 => write!(f, "rotate180"),
            Orientation::Rotate270 => write!(f, "rotate270"),
        }
    }
}

/// 履歴レコード
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: String,

    /// 永続化した画像ファイルのパス
    pub image_path: String,

    /// "<label> with NN.NN%"
    pub result: String,
}

impl PredictionRecord {
    pub fn new(
        id: impl Into<String>,
        image_path: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            image_path: image_path.into(),
            result: result.into(),
        }
    }

    /// 保存可能なレコードか検証
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidRecord("id is empty".into()));
        }
        if is_blank_result(&self.result) {
            return Err(Error::InvalidRecord("result is empty".into()));
        }
        Ok(())
    }

    /// 書き出した履歴（レコードの配列JSON）を読み込み、各レコードを検証
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        let records: Vec<Self> = serde_json::from_str(json)?;
        for (i, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|e| Error::InvalidRecord(format!("record {}: {}", i, e)))?;
        }
        Ok(records)
    }
}
