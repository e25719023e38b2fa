//! Storage for payment receipts and dispute evidence

use crate::error::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Extensions accepted for receipts and evidence
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

/// Writes uploaded files under one directory with generated names
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: PathBuf, max_bytes: usize) -> Self {
        Self { root, max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate and store one file; returns the path relative to the upload root
    pub async fn save(&self, category: &str, original_name: &str, bytes: &[u8]) -> AppResult<String> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let extension = allowed_extension(original_name)?;
        let relative = format!("{}/{}.{}", category, Uuid::new_v4(), extension);
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        info!("Stored upload {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Lowercased extension if it is on the whitelist
pub fn allowed_extension(file_name: &str) -> AppResult<String> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| AppError::Validation("File must have an extension".to_string()))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Validation(format!(
            "File type .{} is not allowed; use one of {:?}",
            extension, ALLOWED_EXTENSIONS
        )));
    }

    Ok(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("receipt.PNG").unwrap(), "png");
        assert_eq!(allowed_extension("scan.final.pdf").unwrap(), "pdf");
        assert!(allowed_extension("script.sh").is_err());
        assert!(allowed_extension("noextension").is_err());
        assert!(allowed_extension("../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_save_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 1024);

        let relative = store.save("receipts", "bank slip.jpg", b"fake-jpeg").await.unwrap();

        assert!(relative.starts_with("receipts/"));
        assert!(relative.ends_with(".jpg"));
        assert_eq!(std::fs::read(store.resolve(&relative)).unwrap(), b"fake-jpeg");
    }

    #[tokio::test]
    async fn test_save_rejects_oversized_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 4);

        let err = store.save("receipts", "a.png", b"too large").await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));

        let err = store.save("receipts", "a.png", b"").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
