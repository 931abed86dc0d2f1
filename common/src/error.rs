//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Orientation, PredictionRecord};

    #[test]
    fn test_unknown_orientation_is_config_error() {
        let error = "sideways".parse::<Orientation>().unwrap_err();
        assert!(matches!(error, Error::Config(_)));
        assert_eq!(error.to_string(), "Config error: unknown orientation: sideways");
    }

    #[test]
    fn test_blank_record_is_invalid() {
        let error = PredictionRecord::new("", "/images/a.jpg", "benign with 87.00%")
            .validate()
            .unwrap_err();
        assert_eq!(error.to_string(), "Invalid record: id is empty");

        let error = PredictionRecord::new("a", "/images/a.jpg", " ")
            .validate()
            .unwrap_err();
        assert_eq!(error.to_string(), "Invalid record: result is empty");
    }

    #[test]
    fn test_malformed_snapshot_is_json_error() {
        // resultが欠けている
        let error = PredictionRecord::list_from_json(r#"[{"id": "a", "imagePath": "/a.jpg"}]"#)
            .unwrap_err();
        assert!(matches!(error, Error::Json(_)));
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_snapshot_with_blank_record_names_index() {
        let json = r#"[
            {"id": "a", "imagePath": "/a.jpg", "result": "benign with 87.00%"},
            {"id": "b", "imagePath": "/b.jpg", "result": ""}
        ]"#;
        let error = PredictionRecord::list_from_json(json).unwrap_err();
        assert!(matches!(error, Error::InvalidRecord(ref m) if m.starts_with("record 1")));
    }
}
