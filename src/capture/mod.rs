use log::info;
use serde::Serialize;
use sha2::{ Digest, Sha256 };
use std::collections::BTreeMap;
use std::path::{ Path, PathBuf };
use tokio::sync::RwLock;

use crate::error::{ AnalyzerError, ValidationError };

pub const CAPTURE_EXTENSION: &str = ".pcap";
const CAPTURE_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    pub size: usize,
}

/// Uploaded captures, keyed by a digest of their bytes.
pub struct CaptureStore {
    dir: PathBuf,
    captures: RwLock<BTreeMap<String, Capture>>,
}

pub fn capture_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut id = hex::encode(digest);
    id.truncate(CAPTURE_ID_LEN);
    id
}

fn sanitize_filename(filename: &str) -> Option<String> {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .filter(|name| !name.is_empty())
}

impl CaptureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            captures: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn store(&self, filename: &str, bytes: &[u8]) -> Result<Capture, AnalyzerError> {
        if !filename.ends_with(CAPTURE_EXTENSION) {
            return Err(ValidationError::BadExtension(filename.to_string()).into());
        }
        let filename = sanitize_filename(filename).ok_or_else(||
            ValidationError::MalformedUpload(format!("unusable filename '{}'", filename))
        )?;

        let id = capture_id(bytes);
        let path = self.dir.join(format!("{}_{}", id, filename));
        tokio::fs::write(&path, bytes).await?;

        let capture = Capture {
            id: id.clone(),
            filename,
            path,
            size: bytes.len(),
        };
        self.captures.write().await.insert(id, capture.clone());
        info!("Stored capture {} ({} bytes) at {}", capture.id, capture.size, capture.path.display());
        Ok(capture)
    }

    pub async fn resolve(&self, id: &str) -> Result<Capture, ValidationError> {
        self.captures
            .read().await
            .get(id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCapture(id.to_string()))
    }

    pub async fn files(&self) -> BTreeMap<String, String> {
        self.captures
            .read().await
            .iter()
            .map(|(id, capture)| (id.clone(), capture.path.display().to_string()))
            .collect()
    }

    /// Forgets every registered capture. Files already written stay on disk.
    pub async fn clear(&self) {
        self.captures.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_bytes_share_one_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());

        let first = store.store("call.pcap", b"same bytes").await.unwrap();
        let second = store.store("call.pcap", b"same bytes").await.unwrap();
        let other = store.store("call.pcap", b"other bytes").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.path, second.path);
        assert_ne!(first.id, other.id);
        assert_eq!(first.id.len(), CAPTURE_ID_LEN);
        assert_eq!(store.files().await.len(), 2);
    }

    #[tokio::test]
    async fn rejects_other_extensions_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());

        let err = store.store("notes.txt", b"hello").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Validation(ValidationError::BadExtension(_))));

        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 0);
        assert!(store.files().await.is_empty());
    }

    #[tokio::test]
    async fn resolves_stored_captures_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        let capture = store.store("ngap.pcap", &[0u8; 200]).await.unwrap();

        assert_eq!(store.resolve(&capture.id).await.unwrap(), capture);
        assert_eq!(std::fs::read(&capture.path).unwrap().len(), 200);
        assert!(matches!(store.resolve("missing").await, Err(ValidationError::UnknownCapture(_))));
    }

    #[tokio::test]
    async fn strips_directories_from_uploaded_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        let capture = store.store("../../etc/evil.pcap", b"x").await.unwrap();

        assert_eq!(capture.filename, "evil.pcap");
        assert_eq!(capture.path.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn clear_forgets_registrations() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        let capture = store.store("a.pcap", b"a").await.unwrap();
        store.clear().await;
        assert!(store.resolve(&capture.id).await.is_err());
    }
}
