use chrono::Utc;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub request: Value,
    pub response: String,
}

impl HistoryEntry {
    pub fn now(request: Value, response: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            request,
            response: response.into(),
        }
    }
}

/// Append-only log of analyze requests and their final answers.
#[derive(Default)]
pub struct HistoryLog {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, entry: HistoryEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn all(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
