use anyhow::Context;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::TrackerError;

/// Route prefix the stored images are served under.
pub const IMAGE_ROUTE: &str = "/images";

/// Stores uploaded meal photos on disk and hands back a public URL for them.
pub struct ImageStore {
    root: PathBuf,
    public_base_url: String,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save an image as `{root}/{user_id}/{millis}.{ext}` and return its public URL.
    pub async fn save(
        &self,
        user_id: Uuid,
        content_type: Option<&str>,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, TrackerError> {
        if bytes.is_empty() {
            return Err(TrackerError::Invalid("Image file is empty".to_string()));
        }
        let ext = image_extension(content_type, file_name).ok_or_else(|| {
            TrackerError::Invalid(format!(
                "Unsupported image type: {}",
                content_type.unwrap_or("unknown")
            ))
        })?;

        let dir = self.root.join(user_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create image directory {}", dir.display()))?;

        let file_name = format!("{}.{}", chrono::Utc::now().timestamp_millis(), ext);
        let path = dir.join(&file_name);
        log::info!("💾 Writing {} bytes to: {}", bytes.len(), path.display());
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write image {}", path.display()))?;

        Ok(format!(
            "{}{}/{}/{}",
            self.public_base_url, IMAGE_ROUTE, user_id, file_name
        ))
    }
}

/// File extension for an upload, taken from the file name when it looks like an
/// image and from the content type otherwise. `None` if it is not an image.
fn image_extension(content_type: Option<&str>, file_name: Option<&str>) -> Option<String> {
    if let Some(ct) = content_type {
        if !ct.starts_with("image/") {
            return None;
        }
    }

    let from_name = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| matches!(e.as_str(), "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic"));
    if from_name.is_some() {
        return from_name;
    }

    match content_type? {
        "image/jpeg" | "image/jpg" => Some("jpg".to_string()),
        "image/png" => Some("png".to_string()),
        "image/gif" => Some("gif".to_string()),
        "image/webp" => Some("webp".to_string()),
        "image/heic" => Some("heic".to_string()),
        _ => None,
    }
}
