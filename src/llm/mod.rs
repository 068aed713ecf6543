pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;
use std::time::Duration;

/// Providers reachable through an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    OpenAI,
    Ollama,
    DeepSeek,
    Groq,
    XAI,
}

impl LlmType {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmType::OpenAI => "https://api.openai.com/v1",
            LlmType::Ollama => "http://localhost:11434/v1",
            LlmType::DeepSeek => "https://api.deepseek.com/v1",
            LlmType::Groq => "https://api.groq.com/openai/v1",
            LlmType::XAI => "https://api.x.ai/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmType::Ollama)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            "deepseek" => Ok(LlmType::DeepSeek),
            "groq" => Ok(LlmType::Groq),
            "xai" => Ok(LlmType::XAI),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: String,
    pub base_url: Option<String>,
    pub max_completion_tokens: u32,
    pub reasoning_effort: Option<String>,
    /// Wall-clock limit for one completion request, response body included.
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::OpenAI,
            api_key: None,
            completion_model: "o4-mini".to_string(),
            base_url: None,
            max_completion_tokens: 5000,
            reasoning_effort: Some("high".to_string()),
            timeout: Duration::from_secs(300),
        }
    }
}
