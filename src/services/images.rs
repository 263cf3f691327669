//! Cover image storage

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::lookup::{FetchedImage, LookupError};
use crate::models::{CoverImage, ImageSource};

/// Persists downloaded images and describes the stored copy
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, image: &FetchedImage, source: ImageSource) -> Result<CoverImage, LookupError>;
}

/// Content-addressed image files: `<root>/<sha256>.<ext>`
#[derive(Debug, Clone)]
pub struct FileSystemImageStore {
    root: PathBuf,
}

impl FileSystemImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn extension(content_type: Option<&str>) -> &'static str {
        match content_type {
            Some("image/jpeg") | Some("image/jpg") => "jpg",
            Some("image/png") => "png",
            Some("image/gif") => "gif",
            Some("image/webp") => "webp",
            Some("image/avif") => "avif",
            _ => "img",
        }
    }
}

#[async_trait]
impl ImageStore for FileSystemImageStore {
    async fn save(&self, image: &FetchedImage, source: ImageSource) -> Result<CoverImage, LookupError> {
        let digest = hex::encode(Sha256::digest(&image.bytes));
        let file_name = format!("{}.{}", digest, Self::extension(image.content_type.as_deref()));
        let path = self.root.join(&file_name);

        let storage_err = |e: std::io::Error| LookupError::Storage(format!("{}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.root).await.map_err(storage_err)?;

        // Same content, same name: an existing file is already the right one
        if tokio::fs::try_exists(&path).await.map_err(storage_err)? {
            tracing::debug!("Image {} already stored", file_name);
        } else {
            let tmp = self.root.join(format!(".{}.tmp", file_name));
            tokio::fs::write(&tmp, &image.bytes).await.map_err(storage_err)?;
            tokio::fs::rename(&tmp, &path).await.map_err(storage_err)?;
            tracing::debug!("Stored image {} ({} bytes)", file_name, image.bytes.len());
        }

        Ok(CoverImage {
            reference: file_name,
            source_url: image.url.clone(),
            content_type: image.content_type.clone(),
            sha256: digest,
            size_bytes: image.bytes.len() as u64,
            source,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bytes: &[u8]) -> FetchedImage {
        FetchedImage {
            url: "http://covers.example/dune.jpg".to_string(),
            bytes: bytes.to_vec(),
            content_type: Some("image/jpeg".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemImageStore::new(dir.path().join("covers"));

        let first = store.save(&image(b"jpeg-bytes"), ImageSource::DirectUrl).await.unwrap();
        let second = store
            .save(
                &image(b"jpeg-bytes"),
                ImageSource::Search {
                    service: "openlibrary".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(first.reference, second.reference);
        assert!(first.reference.ends_with(".jpg"));
        assert_eq!(first.size_bytes, 10);
        let stored = std::fs::read(store.root().join(&first.reference)).unwrap();
        assert_eq!(stored, b"jpeg-bytes");
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(FileSystemImageStore::extension(Some("image/png")), "png");
        assert_eq!(FileSystemImageStore::extension(None), "img");
    }
}
