//! 画像ソース解決モジュール
//!
//! ユーザーが選んだ画像参照（ファイル・file:// URI・リモートURL）を読み込み、
//! デコード済みのピクセルに変換する。失敗はすべて SourceUnavailable。
//! リトライはしない（呼び出し側で再選択を促す）。

mod exif;

use crate::error::{AppError, Result};
use asclepius_common::Orientation;
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// 画像参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    File(PathBuf),
    /// file:// 形式のURI
    ContentUri(String),
    /// http(s):// のURL
    Remote(String),
}

impl ImageReference {
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ImageReference::Remote(trimmed.to_string())
        } else if lower.starts_with("file://") {
            ImageReference::ContentUri(trimmed.to_string())
        } else {
            ImageReference::File(PathBuf::from(trimmed))
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        ImageReference::File(path.as_ref().to_path_buf())
    }

    /// ファイル名（保存時のログ用）
    pub fn file_name(&self) -> String {
        match self {
            ImageReference::File(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            ImageReference::ContentUri(u) | ImageReference::Remote(u) => u
                .split(['?', '#'])
                .next()
                .and_then(|s| s.rsplit('/').next())
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// ローカルで読めるパス（file:// 以外のURIはNone）
    fn local_path(&self) -> Option<PathBuf> {
        match self {
            ImageReference::File(p) => Some(p.clone()),
            ImageReference::ContentUri(u) => {
                // スキームの大小文字・localhostホスト・%エンコードはUrlに任せる
                let url = reqwest::Url::parse(u).ok()?;
                if url.scheme() != "file" {
                    return None;
                }
                url.to_file_path().ok()
            }
            ImageReference::Remote(_) => None,
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageReference::File(p) => write!(f, "{}", p.display()),
            ImageReference::ContentUri(u) | ImageReference::Remote(u) => write!(f, "{}", u),
        }
    }
}

/// デコード済み画像
#[derive(Debug, Clone)]
pub struct RawImage {
    /// EXIFの向きを適用済みのピクセル
    pub image: DynamicImage,
    /// 元のエンコード済みバイト数
    pub encoded_len: usize,
    /// 元画像のEXIF向き
    pub exif_orientation: Orientation,
}

#[derive(Debug, Clone, Default)]
pub struct ImageResolver {
    http: reqwest::Client,
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// 画像参照を読み込んでデコード
    pub async fn resolve(&self, reference: &ImageReference) -> Result<RawImage> {
        let bytes = self.read_bytes(reference).await?;

        let decoded = tokio::task::spawn_blocking(move || decode(&bytes))
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("decode task failed: {}", e)))?;

        decoded.map_err(|e| match e {
            AppError::SourceUnavailable(msg) => {
                AppError::SourceUnavailable(format!("{}: {}", reference, msg))
            }
            other => other,
        })
    }

    async fn read_bytes(&self, reference: &ImageReference) -> Result<Vec<u8>> {
        if !matches!(reference, ImageReference::Remote(_)) {
            let path = reference.local_path().ok_or_else(|| {
                AppError::SourceUnavailable(format!("{}: not a readable file reference", reference))
            })?;
            return tokio::fs::read(&path).await.map_err(|e| {
                AppError::SourceUnavailable(format!("{}: {}", path.display(), e))
            });
        }

        let url = reference.to_string();
        tracing::debug!(%url, "fetching remote image");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::SourceUnavailable(format!("{}: {}", url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// エンコード済みバイト列をデコードし、EXIFの向きを適用
pub fn decode(bytes: &[u8]) -> Result<RawImage> {
    if bytes.is_empty() {
        return Err(AppError::SourceUnavailable("file is empty".into()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| AppError::SourceUnavailable(format!("cannot decode image: {}", e)))?;

    let exif_orientation = exif::read_orientation(bytes).unwrap_or_default();
    let image = rotate(image, exif_orientation);

    Ok(RawImage {
        image,
        encoded_len: bytes.len(),
        exif_orientation,
    })
}

/// 時計回りに回転
pub fn rotate(image: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Identity => image,
        Orientation::Rotate90 => image.rotate90(),
        Orientation::Rotate180 => image.rotate180(),
        Orientation::Rotate270 => image.rotate270(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            ImageReference::parse("https://example.com/a.jpg"),
            ImageReference::Remote("https://example.com/a.jpg".into())
        );
        assert_eq!(
            ImageReference::parse("file:///tmp/a.jpg"),
            ImageReference::ContentUri("file:///tmp/a.jpg".into())
        );
        assert_eq!(
            ImageReference::parse(" photos/a.jpg "),
            ImageReference::File(PathBuf::from("photos/a.jpg"))
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(ImageReference::parse("/tmp/x/skin.png").file_name(), "skin.png");
        assert_eq!(
            ImageReference::parse("https://example.com/img/mole.jpg?size=2").file_name(),
            "mole.jpg"
        );
    }

    #[test]
    fn test_content_uri_local_path() {
        let r = ImageReference::parse("file:///tmp/a.jpg");
        assert_eq!(r.local_path(), Some(PathBuf::from("/tmp/a.jpg")));
        let r = ImageReference::parse("file://localhost/tmp/b.jpg");
        assert_eq!(r.local_path(), Some(PathBuf::from("/tmp/b.jpg")));
    }

    #[test]
    fn test_content_uri_percent_decoded() {
        let r = ImageReference::parse("FILE:///tmp/my%20mole.jpg");
        assert_eq!(r.local_path(), Some(PathBuf::from("/tmp/my mole.jpg")));
    }

    #[test]
    fn test_malformed_content_uri_has_no_path() {
        assert_eq!(ImageReference::ContentUri("abc".into()).local_path(), None);
        assert_eq!(ImageReference::ContentUri("".into()).local_path(), None);
        assert_eq!(
            ImageReference::ContentUri("content://media/external/images/1".into()).local_path(),
            None
        );
        assert_eq!(ImageReference::ContentUri("file://remote-host/a.jpg".into()).local_path(), None);
    }

    #[tokio::test]
    async fn test_resolve_malformed_content_uri() {
        let resolver = ImageResolver::new();
        for uri in ["abc", "", "content://media/external/images/1"] {
            let err = resolver
                .resolve(&ImageReference::ContentUri(uri.into()))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::SourceUnavailable(_)), "{}: {:?}", uri, err);
        }
    }

    #[tokio::test]
    async fn test_resolve_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lesion.png");
        write_png(&path, 40, 30);

        let raw = ImageResolver::new()
            .resolve(&ImageReference::file(&path))
            .await
            .unwrap();
        assert_eq!(raw.image.width(), 40);
        assert_eq!(raw.image.height(), 30);
        assert_eq!(raw.exif_orientation, Orientation::Identity);
        assert!(raw.encoded_len > 0);
    }

    #[tokio::test]
    async fn test_resolve_content_uri() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lesion.png");
        write_png(&path, 8, 8);

        let uri = format!("file://{}", path.display());
        let raw = ImageResolver::new()
            .resolve(&ImageReference::parse(&uri))
            .await
            .unwrap();
        assert_eq!(raw.image.width(), 8);
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let err = ImageResolver::new()
            .resolve(&ImageReference::file("/nonexistent/lesion.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_resolve_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = ImageResolver::new()
            .resolve(&ImageReference::file(&path))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable(_)));
        assert!(err.to_string().contains("broken.jpg"));
    }

    #[test]
    fn test_decode_empty() {
        assert!(matches!(decode(&[]), Err(AppError::SourceUnavailable(_))));
    }

    #[test]
    fn test_rotate_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 2));
        let rotated = rotate(img.clone(), Orientation::Rotate90);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
        let same = rotate(img, Orientation::Rotate180);
        assert_eq!((same.width(), same.height()), (4, 2));
    }
}
