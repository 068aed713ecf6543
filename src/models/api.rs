use serde::{ Serialize, Deserialize };
use serde_json::{ Map, Value };
use std::collections::BTreeMap;

use super::chat::ChatMessage;
use crate::history::HistoryEntry;

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub size: usize,
    pub packet_count: usize,
    pub message: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AnalyzeRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AnalyzeResponse {
    pub response: String,
    pub model_used: String,
    pub kernel_state: SessionSnapshot,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: Map<String, Value>,
    pub imports: Vec<String>,
    pub files: BTreeMap<String, String>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}
