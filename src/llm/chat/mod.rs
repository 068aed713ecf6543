pub mod openai;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::models::chat::Role;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("reasoning service does not support tool calling: {0}")]
    ToolsUnsupported(String),
    #[error("reasoning service returned {status}: {body}")]
    Http {
        status: u16,
        body: String,
    },
    #[error("reasoning service did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("reasoning service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed reasoning service response: {0}")]
    MalformedResponse(String),
    #[error("reasoning client misconfigured: {0}")]
    Config(String),
}

/// A tool call requested by the model. `id` is the transient token the
/// matching tool-role message must echo back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One completion request. `tools` is `None` when the model must answer
    /// in plain text.
    async fn chat(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>
    ) -> Result<ChatCompletion, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
