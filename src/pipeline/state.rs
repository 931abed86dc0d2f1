use crate::error::ErrorKind;
use crate::normalizer::NormalizedImage;
use crate::resolver::ImageReference;
use asclepius_common::{Classification, PredictionRecord};
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

/// 分類済みの画像と結果
#[derive(Debug, Clone)]
pub struct ClassifiedImage {
    pub reference: ImageReference,
    /// 向き補正済みの元画像（保存時に再エンコードする）
    pub image: Arc<DynamicImage>,
    pub classification: Classification,
    pub result_text: String,
}

/// パイプラインの状態
#[derive(Debug, Clone, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    ImageSelected(ImageReference),
    Normalized {
        reference: ImageReference,
        image: Arc<DynamicImage>,
        input: NormalizedImage,
    },
    Classified(ClassifiedImage),
    Saving,
    Saved(PredictionRecord),
    Discarded,
    Failed(String),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::ImageSelected(_) => "ImageSelected",
            PipelineState::Normalized { .. } => "Normalized",
            PipelineState::Classified(_) => "Classified",
            PipelineState::Saving => "Saving",
            PipelineState::Saved(_) => "Saved",
            PipelineState::Discarded => "Discarded",
            PipelineState::Failed(_) => "Failed",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(msg) => write!(f, "Failed({})", msg),
            other => f.write_str(other.name()),
        }
    }
}

/// ユーザーに表示する通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error { kind: ErrorKind, message: String },
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Info(message) | Notice::Error { message, .. } => message,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Notice::Info(_) => None,
            Notice::Error { kind, .. } => Some(*kind),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// 非同期処理の結果を反映したかどうか
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// 処理中に中断されたため結果は破棄した
    Stale,
}

impl<T> Outcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Stale => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Outcome::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Idle.to_string(), "Idle");
        assert_eq!(
            PipelineState::Failed("model missing".into()).to_string(),
            "Failed(model missing)"
        );
        assert!(PipelineState::default().is_idle());
    }

    #[test]
    fn test_notice_kind() {
        let notice = Notice::Error {
            kind: ErrorKind::Inference,
            message: "bad input".into(),
        };
        assert_eq!(notice.kind(), Some(ErrorKind::Inference));
        assert_eq!(notice.to_string(), "bad input");
        assert_eq!(Notice::Info("ok".into()).kind(), None);
    }

    #[test]
    fn test_outcome_applied() {
        assert_eq!(Outcome::Applied(3).applied(), Some(3));
        assert!(Outcome::<u8>::Stale.is_stale());
        assert_eq!(Outcome::<u8>::Stale.applied(), None);
    }
}
