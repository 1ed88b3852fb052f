//! Materialization of media blobs into dereferenceable URLs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use vzone_common::error::VzoneResult;
use vzone_project_model::{ArtifactUrl, MediaBlob};

/// Turns media bytes into a URL a consumer can open.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn materialize(&self, blob: &MediaBlob) -> VzoneResult<ArtifactUrl>;
}

/// File extension for a media type.
pub fn extension_for(media_type: &str) -> &'static str {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "application/json" => "json",
        _ => "bin",
    }
}

/// Writes blobs into a directory and hands out `file://` URLs.
pub struct FileBlobStore {
    dir: PathBuf,
    next: AtomicU64,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl BlobStore for FileBlobStore {
    async fn materialize(&self, blob: &MediaBlob) -> VzoneResult<ArtifactUrl> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = format!(
            "vzone-{stamp}-{seq:03}.{}",
            extension_for(blob.media_type())
        );
        let path = self.dir.join(name);
        tokio::fs::write(&path, blob.bytes()).await?;

        let absolute = tokio::fs::canonicalize(&path).await.unwrap_or(path);
        tracing::info!(path = %absolute.display(), bytes = blob.len(), "Artifact written");
        Ok(ArtifactUrl::new(format!("file://{}", absolute.display())))
    }
}

/// Keeps blobs in memory behind `blob:vzone/<n>` URLs.
#[derive(Default)]
pub struct MemoryBlobStore {
    next: AtomicU64,
    blobs: Mutex<HashMap<ArtifactUrl, MediaBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a URL handed out by this store.
    pub fn get(&self, url: &ArtifactUrl) -> Option<MediaBlob> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn materialize(&self, blob: &MediaBlob) -> VzoneResult<ArtifactUrl> {
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let url = ArtifactUrl::new(format!("blob:vzone/{seq}"));
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.clone(), blob.clone());
        Ok(url)
    }
}
