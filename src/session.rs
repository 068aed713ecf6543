use log::info;
use serde_json::Map;
use std::path::PathBuf;

use crate::capture::CaptureStore;
use crate::history::HistoryLog;
use crate::models::api::SessionSnapshot;

/// Everything a running analyzer remembers between requests.
///
/// Handed to every handler through router state. `reset` is the only
/// teardown; nothing is persisted across restarts.
pub struct Session {
    captures: CaptureStore,
    history: HistoryLog,
}

impl Session {
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            captures: CaptureStore::new(capture_dir),
            history: HistoryLog::new(),
        }
    }

    pub fn captures(&self) -> &CaptureStore {
        &self.captures
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// The `state` map and `imports` list are part of the wire shape the
    /// frontend reads; this backend never populates them.
    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: Map::new(),
            imports: Vec::new(),
            files: self.captures.files().await,
            history: self.history.all().await,
        }
    }

    pub async fn reset(&self) {
        self.captures.clear().await;
        self.history.clear().await;
        info!("Session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEntry;
    use serde_json::json;

    #[tokio::test]
    async fn reset_empties_files_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path());
        let capture = session.captures().store("x.pcap", b"abc").await.unwrap();
        session.history().record(HistoryEntry::now(json!({}), "answer")).await;

        let before = session.snapshot().await;
        assert_eq!(before.files.get(&capture.id), Some(&capture.path.display().to_string()));
        assert_eq!(before.history.len(), 1);

        session.reset().await;
        let after = session.snapshot().await;
        assert!(after.files.is_empty());
        assert!(after.history.is_empty());
        assert!(after.state.is_empty());
    }
}
