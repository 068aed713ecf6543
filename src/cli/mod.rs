use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP API to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8000")]
    pub server_addr: String,

    /// Origin allowed by the CORS layer (the web frontend).
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Largest accepted request body in bytes (uploads included).
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "268435456")]
    pub max_upload_bytes: usize,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama, deepseek, groq, xai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.openai.com/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let the provider type decide
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., o4-mini, gpt-4o, llama3.1)
    #[arg(long, env = "CHAT_MODEL", default_value = "o4-mini")]
    pub chat_model: String,

    /// Upper bound on generated tokens per completion request.
    #[arg(long, env = "MAX_COMPLETION_TOKENS", default_value = "5000")]
    pub max_completion_tokens: u32,

    /// Reasoning effort hint (low, medium, high). Empty disables the hint.
    #[arg(long, env = "REASONING_EFFORT", default_value = "high")]
    pub reasoning_effort: String,

    /// Seconds a single completion request may take before it is abandoned.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "300")]
    pub llm_timeout_secs: u64,

    /// Path to an optional prompt configuration file overriding the built-in prompts.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Capture / Dissector Args ---
    /// Directory uploaded captures are written to. Defaults to the system temp dir.
    #[arg(long, env = "CAPTURE_DIR")]
    pub capture_dir: Option<String>,

    /// Path or name of the tshark binary.
    #[arg(long, env = "TSHARK_PATH", default_value = "tshark")]
    pub tshark_path: String,

    /// Packets beyond this ceiling are not counted on upload.
    #[arg(long, env = "UPLOAD_PACKET_CEILING", default_value = "10000")]
    pub upload_packet_ceiling: usize,

    /// Seconds allowed for counting packets on upload.
    #[arg(long, env = "UPLOAD_TIMEOUT_SECS", default_value = "30")]
    pub upload_timeout_secs: u64,

    /// Packets sampled for the capture summary sent with the first user turn.
    #[arg(long, env = "SUMMARY_PACKET_LIMIT", default_value = "50")]
    pub summary_packet_limit: usize,

    /// Seconds allowed for building the capture summary.
    #[arg(long, env = "SUMMARY_TIMEOUT_SECS", default_value = "60")]
    pub summary_timeout_secs: u64,

    /// Packets examined by a tool call that does not name its own limit.
    #[arg(long, env = "TOOL_DEFAULT_LIMIT", default_value = "200")]
    pub tool_default_limit: usize,

    /// Hard cap on the limit a tool call may request.
    #[arg(long, env = "TOOL_MAX_LIMIT", default_value = "1000")]
    pub tool_max_limit: usize,

    /// Seconds allowed for a single tool-invoked extraction.
    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value = "20")]
    pub tool_timeout_secs: u64,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn reasoning_effort(&self) -> Option<String> {
        let effort = self.reasoning_effort.trim();
        if effort.is_empty() {
            None
        } else {
            Some(effort.to_string())
        }
    }
}
