//! Raw and exported media artifacts.
//!
//! Artifacts are immutable once created. Bytes are shared, so cloning an
//! artifact into a snapshot or an export job does not copy the media.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Media type of the raw capture.
pub const RAW_MEDIA_TYPE: &str = "video/webm";

/// Media type of the exported video.
pub const EXPORT_MEDIA_TYPE: &str = "video/mp4";

/// Filename offered when the exported artifact is downloaded.
pub const EXPORT_DOWNLOAD_NAME: &str = "vzone_recording.mp4";

/// A dereferenceable URL for materialized media (`file://`, `blob:`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactUrl(String);

impl ArtifactUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque media bytes tagged with a media type.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    bytes: Arc<[u8]>,
    media_type: String,
}

impl MediaBlob {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    /// Concatenate recorder chunks in arrival order.
    pub fn from_chunks(chunks: &[Vec<u8>], media_type: impl Into<String>) -> Self {
        let bytes: Vec<u8> = chunks.concat();
        Self::new(bytes, media_type)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

impl std::fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaBlob")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// The raw media produced when a capture session finalizes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedArtifact {
    pub blob: MediaBlob,

    /// Preview URL for the raw media, once materialized.
    pub url: Option<ArtifactUrl>,

    /// Seconds the recorder was actively capturing.
    pub duration_secs: u64,
}

impl RecordedArtifact {
    pub fn new(blob: MediaBlob, duration_secs: u64) -> Self {
        Self {
            blob,
            url: None,
            duration_secs,
        }
    }

    pub fn with_url(mut self, url: ArtifactUrl) -> Self {
        self.url = Some(url);
        self
    }
}

/// The derived artifact produced by a successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedArtifact {
    pub blob: MediaBlob,
    pub url: ArtifactUrl,
    pub download_name: String,
}

impl ExportedArtifact {
    pub fn new(blob: MediaBlob, url: ArtifactUrl) -> Self {
        Self {
            blob,
            url,
            download_name: EXPORT_DOWNLOAD_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_chunks_preserves_order() {
        let blob = MediaBlob::from_chunks(&[vec![1, 2], vec![], vec![3]], RAW_MEDIA_TYPE);
        assert_eq!(blob.bytes(), &[1, 2, 3]);
        assert_eq!(blob.media_type(), "video/webm");
    }

    #[test]
    fn test_clone_shares_bytes() {
        let blob = MediaBlob::new(vec![0u8; 1024], RAW_MEDIA_TYPE);
        let copy = blob.clone();
        assert!(std::ptr::eq(blob.bytes().as_ptr(), copy.bytes().as_ptr()));
    }

    #[test]
    fn test_exported_artifact_download_name() {
        let artifact = ExportedArtifact::new(
            MediaBlob::new(vec![1], EXPORT_MEDIA_TYPE),
            ArtifactUrl::new("blob:vzone/1"),
        );
        assert_eq!(artifact.download_name, "vzone_recording.mp4");
    }
}
