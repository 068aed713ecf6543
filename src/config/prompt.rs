use serde::Deserialize;
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

use crate::llm::chat::ToolDefinition;

pub const ANALYZE_PCAP_TOOL: &str = "analyze_pcap";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a 5G control plane traffic analyzer with access to a PCAP analysis tool.

You have the analyze_pcap tool that lets you search packets by:
- display_filter: Wireshark filters like \"ngap\", \"nas-5gs\", \"pfcp\", or complex filters
- field_patterns: Search for fields containing specific patterns like \"qos\", \"qfi\", \"bitrate\", \"gbr\", \"mbr\"

For QoS analysis:
1. First search PDU Session packets: display_filter=\"ngap\" with field_patterns=[\"qos\", \"qfi\", \"5qi\", \"bitrate\", \"gbr\", \"mbr\"]
2. Also check PFCP packets: display_filter=\"pfcp\" with field_patterns=[\"qos\", \"pdr\", \"far\", \"qer\"]
3. Look for fields like:
   - qosFlowLevelQosParameters
   - qfi (QoS Flow Identifier)
   - fiveQI or 5qi
   - gbrQosInformation
   - maximumBitRate, guaranteedFlowBitRate
   - priorityLevelQos

Always use the tool to get actual data before answering.";

const DEFAULT_TOOL_DESCRIPTION: &str =
    "Analyze PCAP file using tshark with filters to extract specific packet data";

const DEFAULT_CONTEXT_HINT: &str =
    "Use the analyze_pcap tool to search for specific information like QoS parameters.";

#[derive(Debug)]
pub enum PromptError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub tool_description: String,
    pub context_hint: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tool_description: DEFAULT_TOOL_DESCRIPTION.to_string(),
            context_hint: DEFAULT_CONTEXT_HINT.to_string(),
        }
    }
}

/// Reads a prompts file; keys it leaves out keep their built-in text.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    let Some(path) = path else {
        return Ok(Arc::new(PromptConfig::default()));
    };
    let file_content = fs::read_to_string(path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    info!("Loaded prompts from: {}", path);
    Ok(Arc::new(config))
}

pub fn analyze_pcap_tool(config: &PromptConfig) -> ToolDefinition {
    ToolDefinition {
        name: ANALYZE_PCAP_TOOL.to_string(),
        description: config.tool_description.clone(),
        parameters: json!({
            "type": "object",
            "properties": {
                "display_filter": {
                    "type": "string",
                    "description": "Wireshark display filter (e.g., 'ngap', 'nas-5gs', 'sctp.port==38412')"
                },
                "field_patterns": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Pattern to search for in field names (e.g., 'qos', 'qfi', 'bitrate')"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of packets to analyze (default: 200)"
                }
            },
            "required": ["display_filter"]
        }),
    }
}
