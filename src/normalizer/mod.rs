//! 画像正規化モジュール
//!
//! - 分類器入力: 固定サイズ・RGB・u8 のバッファに変換（最近傍リサイズ固定）
//! - 永続化用: JPEG品質を段階的に下げて指定バイト数以内に再エンコード

pub mod reencode;

pub use reencode::{reencode_bounded, EncodedImage, ReencodeOptions};

use asclepius_common::Orientation;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

/// RGB
pub const CHANNELS: usize = 3;

/// 正規化オプション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub width: u32,
    pub height: u32,
}

impl NormalizeOptions {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::square(224)
    }
}

/// 分類器入力用の固定サイズバッファ（RGB、u8、HWC）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl NormalizedImage {
    /// 生バッファから構築（形状の検証は分類時に行う）
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    /// バッファ長が幅×高さ×チャンネル数と一致するか
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == Self::expected_len(self.width, self.height)
    }

    /// 時計回りに回転したバッファを返す（形状不正なら None）
    pub fn oriented(&self, orientation: Orientation) -> Option<NormalizedImage> {
        if orientation == Orientation::Identity {
            return Some(self.clone());
        }

        let img = RgbImage::from_raw(self.width, self.height, self.data.clone())?;
        let rotated = match orientation {
            Orientation::Rotate90 => imageops::rotate90(&img),
            Orientation::Rotate180 => imageops::rotate180(&img),
            Orientation::Rotate270 => imageops::rotate270(&img),
            Orientation::Identity => img,
        };

        Some(NormalizedImage {
            width: rotated.width(),
            height: rotated.height(),
            data: rotated.into_raw(),
        })
    }
}

/// 分類器入力サイズに正規化
///
/// 同じ入力・同じオプションなら常に同一のバッファを返す。
pub fn normalize(image: &DynamicImage, options: &NormalizeOptions) -> NormalizedImage {
    let resized = image
        .resize_exact(options.width, options.height, FilterType::Nearest)
        .to_rgb8();

    NormalizedImage {
        width: options.width,
        height: options.height,
        data: resized.into_raw(),
    }
}
