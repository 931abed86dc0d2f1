//! 保存用JPEG再エンコード
//!
//! 品質100から `quality_step` ずつ下げ、`max_bytes` 以内になった時点で返す。
//! 品質0まで下げても収まらない場合は最小のエンコード結果を返す（エラーにしない）。

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReencodeOptions {
    pub max_bytes: usize,
    pub quality_step: u8,
}

impl Default for ReencodeOptions {
    fn default() -> Self {
        Self {
            max_bytes: 1_000_000,
            quality_step: 5,
        }
    }
}

/// 再エンコード結果
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    /// 採用した品質（0は下限到達）
    pub quality: u8,
    pub within_limit: bool,
}

/// サイズ上限付きJPEG再エンコード
pub fn reencode_bounded(image: &DynamicImage, options: &ReencodeOptions) -> Result<EncodedImage> {
    let rgb = image.to_rgb8();
    let step = options.quality_step.max(1);
    let mut quality: u8 = 100;

    loop {
        let bytes = encode_jpeg(&rgb, quality)?;

        if bytes.len() <= options.max_bytes {
            tracing::debug!(quality, size = bytes.len(), "re-encoded within limit");
            return Ok(EncodedImage {
                bytes,
                quality,
                within_limit: true,
            });
        }

        if quality == 0 {
            tracing::warn!(
                size = bytes.len(),
                max = options.max_bytes,
                "image still exceeds size limit at lowest quality"
            );
            return Ok(EncodedImage {
                bytes,
                quality,
                within_limit: false,
            });
        }

        quality = quality.saturating_sub(step);
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    // エンコーダが受け付ける品質は1以上
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.max(1));
    encoder.encode_image(rgb)?;
    Ok(buf)
}
