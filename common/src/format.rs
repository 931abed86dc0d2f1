//! 結果文字列のフォーマット
//!
//! 表示・保存の両方で同じ書式を使う: `"<label> with <NN.NN>%"`

/// 信頼度をパーセント表記（小数2桁）に変換
///
/// # Examples
/// ```
/// use asclepius_common::format_confidence;
///
/// assert_eq!(format_confidence(0.87), "87.00%");
/// assert_eq!(format_confidence(1.0), "100.00%");
/// ```
pub fn format_confidence(confidence: f32) -> String {
    // f32のまま100倍すると丸め誤差が表示に出るためf64で計算
    format!("{:.2}%", f64::from(confidence) * 100.0)
}

/// 分類ラベルと信頼度から結果文字列を生成
///
/// # Examples
/// ```
/// use asclepius_common::format_result;
///
/// assert_eq!(format_result("benign", 0.87), "benign with 87.00%");
/// ```
pub fn format_result(label: &str, confidence: f32) -> String {
    format!("{} with {}", label, format_confidence(confidence))
}

/// 保存不可の空結果か
pub fn is_blank_result(result: &str) -> bool {
    result.trim().is_empty()
}
