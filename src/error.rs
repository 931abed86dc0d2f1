use thiserror::Error;

/// パイプラインの失敗種別（呼び出し側で分岐するための判別子）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    ModelLoad,
    Inference,
    EmptyResult,
    StoreWrite,
    StoreRead,
    Other,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Image source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Analysis unavailable, classifier model could not be loaded: {0}")]
    ModelLoad(String),

    #[error("Classification failed: {0}")]
    Inference(String),

    #[error("Result is empty, nothing to save")]
    EmptyResult,

    #[error("Failed to save prediction: {0}")]
    StoreWrite(String),

    #[error("Failed to read prediction history: {0}")]
    StoreRead(String),

    #[error("Operation not allowed in state {state}: {action}")]
    InvalidState { state: String, action: String },

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("News request failed: {0}")]
    News(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("News API key is not set. Run `asclepius config --set-news-api-key YOUR_KEY` or set NEWS_API_KEY")]
    MissingApiKey,

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] asclepius_common::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            AppError::ModelLoad(_) => ErrorKind::ModelLoad,
            AppError::Inference(_) => ErrorKind::Inference,
            AppError::EmptyResult => ErrorKind::EmptyResult,
            AppError::StoreWrite(_) => ErrorKind::StoreWrite,
            AppError::StoreRead(_) => ErrorKind::StoreRead,
            _ => ErrorKind::Other,
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(e: image::ImageError) -> Self {
        AppError::Image(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::News(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
