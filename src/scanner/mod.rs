//! 一括分類用の画像スキャン

use crate::error::{AppError, Result};
use crate::resolver::ImageReference;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

impl ImageEntry {
    pub fn reference(&self) -> ImageReference {
        ImageReference::file(&self.path)
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// フォルダ内の画像を列挙（パス順）
pub fn scan_folder(folder: &Path, recursive: bool) -> Result<Vec<ImageEntry>> {
    if !folder.is_dir() {
        return Err(AppError::FolderNotFound(folder.display().to_string()));
    }

    let walker = if recursive {
        WalkDir::new(folder)
    } else {
        WalkDir::new(folder).max_depth(1) // 直下のみ
    };

    let mut images: Vec<ImageEntry> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| is_image_extension(&ext.to_string_lossy()))
        })
        .map(|e| ImageEntry {
            file_name: e.file_name().to_string_lossy().to_string(),
            size: e.metadata().map(|m| m.len()).unwrap_or(0),
            path: e.into_path(),
        })
        .collect();

    images.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(folder = %folder.display(), count = images.len(), recursive, "images scanned");

    Ok(images)
}
