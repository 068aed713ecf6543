use crate::capture::Capture;
use crate::config::prompt::{ analyze_pcap_tool, PromptConfig, ANALYZE_PCAP_TOOL };
use crate::error::{ AnalyzerError, ValidationError };
use crate::extract::{ FieldExtractor, ToolInvocation };
use crate::history::HistoryEntry;
use crate::llm::chat::{ ChatClient, ChatCompletion, ConversationMessage, LlmError, ToolCall };
use crate::models::api::AnalyzeRequest;
use crate::models::chat::{ ChatMessage, Role };
use crate::session::Session;

use log::{ debug, error, info, warn };
use serde_json::{ json, Value };
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub summary_packet_limit: usize,
    pub summary_timeout: Duration,
    pub tool_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub response: String,
    pub model_used: String,
}

/// Drives one analyze request: seeds the conversation, lets the model call
/// `analyze_pcap` for a single round, then asks for the final answer.
#[derive(Clone)]
pub struct CallflowAgent {
    chat_client: Arc<dyn ChatClient>,
    extractor: FieldExtractor,
    prompt_config: Arc<PromptConfig>,
    settings: AgentSettings,
}

fn tool_error(message: impl Into<String>) -> String {
    json!({ "error": message.into() }).to_string()
}

fn answer_text(completion: ChatCompletion) -> Result<String, AnalyzerError> {
    match completion.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::MalformedResponse("completion carried no answer text".into()).into()),
    }
}

impl CallflowAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        extractor: FieldExtractor,
        prompt_config: Arc<PromptConfig>,
        settings: AgentSettings
    ) -> Self {
        Self {
            chat_client,
            extractor,
            prompt_config,
            settings,
        }
    }

    pub fn model(&self) -> String {
        self.chat_client.get_model()
    }

    pub fn extractor(&self) -> &FieldExtractor {
        &self.extractor
    }

    pub async fn analyze(
        &self,
        session: &Session,
        request: &AnalyzeRequest
    ) -> Result<AnalysisOutcome, AnalyzerError> {
        // Tool turns only ever answer calls made inside `converse`.
        if let Some(index) = request.messages.iter().position(|m| m.role == Role::Tool) {
            return Err(ValidationError::CallerToolTurn(index).into());
        }
        let capture = match request.file_id.as_deref() {
            Some(id) => Some(session.captures().resolve(id).await?),
            None => None,
        };

        let response = self.converse(&request.messages, capture.as_ref()).await?;

        let payload = serde_json::to_value(request).unwrap_or_else(|e| {
            warn!("Request could not be recorded verbatim in history: {}", e);
            Value::Null
        });
        session.history().record(HistoryEntry::now(payload, response.clone())).await;

        Ok(AnalysisOutcome {
            response,
            model_used: self.model(),
        })
    }

    /// System prompt plus the caller's turns. With a capture, its summary is
    /// appended to the first user turn.
    async fn seed(
        &self,
        messages: &[ChatMessage],
        capture: Option<&Capture>
    ) -> Result<Vec<ConversationMessage>, AnalyzerError> {
        let context = match capture {
            Some(capture) => {
                let limit = self.settings.summary_packet_limit;
                let summary = self.extractor.summarize(
                    &capture.path,
                    limit,
                    self.settings.summary_timeout
                ).await?;
                info!("Capture {} summary: {:?}", capture.id, summary);
                summary.render_context(&capture.filename, limit, &self.prompt_config.context_hint)
            }
            None => String::new(),
        };

        let mut seeded = vec![ConversationMessage::system(self.prompt_config.system_prompt.clone())];
        let mut context_pending = !context.is_empty();
        for message in messages {
            let mut content = message.content.clone();
            if context_pending && message.role == Role::User {
                content.push_str(&context);
                context_pending = false;
            }
            seeded.push(ConversationMessage::text(message.role, content));
        }
        if context_pending {
            seeded.push(ConversationMessage::text(Role::User, context.trim_start()));
        }
        Ok(seeded)
    }

    pub async fn converse(
        &self,
        messages: &[ChatMessage],
        capture: Option<&Capture>
    ) -> Result<String, AnalyzerError> {
        let mut conversation = self.seed(messages, capture).await?;

        let Some(capture) = capture else {
            debug!("No capture attached, requesting a plain answer");
            return self.plain_answer(&conversation).await;
        };

        let tools = [analyze_pcap_tool(&self.prompt_config)];
        let first = match self.chat_client.chat(&conversation, Some(&tools)).await {
            Ok(completion) => completion,
            Err(LlmError::ToolsUnsupported(detail)) => {
                warn!("Tools not supported, answering from capture summary only: {}", detail);
                return self.plain_answer(&conversation).await;
            }
            Err(e) => {
                error!("Reasoning service error: {}", e);
                return Err(e.into());
            }
        };

        if first.tool_calls.is_empty() {
            return answer_text(first);
        }

        info!("Model requested {} tool call(s)", first.tool_calls.len());
        let calls = first.tool_calls.clone();
        conversation.push(ConversationMessage::assistant_tool_calls(first.content, first.tool_calls));
        for call in &calls {
            let output = self.execute_tool_call(call, capture).await;
            conversation.push(ConversationMessage::tool_result(call.id.clone(), output));
        }

        // Tools are not offered again: one round only.
        self.plain_answer(&conversation).await
    }

    async fn plain_answer(&self, conversation: &[ConversationMessage]) -> Result<String, AnalyzerError> {
        let completion = self.chat_client.chat(conversation, None).await.map_err(|e| {
            error!("Reasoning service error: {}", e);
            e
        })?;
        answer_text(completion)
    }

    async fn execute_tool_call(&self, call: &ToolCall, capture: &Capture) -> String {
        if call.name != ANALYZE_PCAP_TOOL {
            warn!("Model called unknown tool '{}'", call.name);
            return tool_error(format!("Unknown tool '{}'", call.name));
        }
        let invocation: ToolInvocation = match serde_json::from_str(&call.arguments) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Unparsable analyze_pcap arguments '{}': {}", call.arguments, e);
                return tool_error(format!("Invalid tool arguments: {}", e));
            }
        };

        match self.extractor.extract(&capture.path, &invocation, self.settings.tool_timeout).await {
            Ok(result) =>
                serde_json::to_string(&result).unwrap_or_else(|e| tool_error(e.to_string())),
            Err(e) => {
                warn!("analyze_pcap '{}' failed: {}", invocation.display_filter, e);
                tool_error(e.to_string())
            }
        }
    }
}
