use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use super::{ ChatClient, ChatCompletion, ConversationMessage, LlmError, ToolCall, ToolDefinition };
use crate::llm::LlmConfig;
use crate::models::chat::Role;

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_completion_tokens: u32,
    reasoning_effort: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAIToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunctionDefinition,
}

#[derive(Serialize)]
struct OpenAIFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for OpenAIToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            call_type: function_type(),
            function: OpenAIFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<&ConversationMessage> for OpenAIMessage {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message.tool_calls.iter().map(OpenAIToolCall::from).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

/// Providers that cannot do tool calling answer with a 4xx that mentions
/// tools; everything else is an ordinary failure.
pub fn classify_failure(status: u16, body: String, tools_offered: bool) -> LlmError {
    let mentions_tools = body.to_lowercase().contains("tool");
    if tools_offered && (status == 400 || status == 422) && mentions_tools {
        LlmError::ToolsUnsupported(body)
    } else {
        LlmError::Http { status, body }
    }
}

pub fn completions_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{}/chat/completions", trimmed)
    }
}

fn into_completion(resp: OpenAIResponse) -> Result<ChatCompletion, LlmError> {
    let message = resp.choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("response carried no choices".to_string()))?
        .message;

    let tool_calls = message.tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: if call.id.is_empty() {
                format!("call_{}", Uuid::new_v4().simple())
            } else {
                call.id
            },
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(ChatCompletion {
        content: message.content,
        tool_calls,
    })
}

impl OpenAIChatClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: String,
        max_completion_tokens: u32,
        reasoning_effort: Option<String>,
        timeout: Duration
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
                    LlmError::Config(format!("Invalid API key format: {}", e))
                )?
            );
        }

        let http = HttpClient::builder().default_headers(headers).timeout(timeout).build()?;

        Ok(Self {
            http,
            model,
            base_url: completions_url(&base_url),
            max_completion_tokens,
            reasoning_effort,
            timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() && config.llm_type.requires_api_key() {
            return Err(
                LlmError::Config(format!("{:?} API key is required", config.llm_type))
            );
        }
        let base_url = config.base_url
            .clone()
            .unwrap_or_else(|| config.llm_type.default_base_url().to_string());

        Self::new(
            api_key,
            config.completion_model.clone(),
            base_url,
            config.max_completion_tokens,
            config.reasoning_effort.clone(),
            config.timeout
        )
    }

    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            warn!("Chat completion to {} timed out after {:?}", self.model, self.timeout);
            LlmError::TimedOut(self.timeout)
        } else {
            LlmError::Transport(err)
        }
    }

    fn build_request(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>
    ) -> OpenAIChatRequest {
        let tools: Option<Vec<OpenAITool>> = tools.map(|defs| {
            defs.iter()
                .map(|def| OpenAITool {
                    tool_type: function_type(),
                    function: OpenAIFunctionDefinition {
                        name: def.name.clone(),
                        description: def.description.clone(),
                        parameters: def.parameters.clone(),
                    },
                })
                .collect()
        });
        let tool_choice = tools.as_ref().map(|_| "auto".to_string());

        OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            tools,
            tool_choice,
            max_completion_tokens: self.max_completion_tokens,
            reasoning_effort: self.reasoning_effort.clone(),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn chat(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>
    ) -> Result<ChatCompletion, LlmError> {
        let req = self.build_request(messages, tools);
        debug!(
            "Sending {} messages to {} (tools offered: {})",
            req.messages.len(),
            self.model,
            req.tools.is_some()
        );

        let resp = self.http
            .post(&self.base_url)
            .json(&req)
            .send().await
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Chat completion failed with {}: {}", status, body);
            return Err(classify_failure(status.as_u16(), body, req.tools.is_some()));
        }

        let parsed = resp.json::<OpenAIResponse>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                LlmError::MalformedResponse(e.to_string())
            }
        })?;
        into_completion(parsed)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyzerError;
    use crate::llm::LlmType;
    use axum::{ http::StatusCode, routing::post, Json, Router };
    use serde_json::json;

    fn client(base_url: &str) -> OpenAIChatClient {
        client_with_timeout(base_url, Duration::from_secs(10))
    }

    fn client_with_timeout(base_url: &str, timeout: Duration) -> OpenAIChatClient {
        OpenAIChatClient::new(
            Some("sk-test".into()),
            "o4-mini".into(),
            base_url.into(),
            5000,
            Some("high".into()),
            timeout
        ).unwrap()
    }

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "analyze_pcap".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    #[test]
    fn serializes_tool_turns_in_wire_format() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "analyze_pcap".into(),
            arguments: r#"{"display_filter":"ngap"}"#.into(),
        };
        let messages = vec![
            ConversationMessage::system("sys"),
            ConversationMessage::assistant_tool_calls(None, vec![call]),
            ConversationMessage::tool_result("call_1", "{}")
        ];
        let tools = [tool()];
        let req = client("http://x/v1").build_request(&messages, Some(&tools));
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["reasoning_effort"], "high");
        assert_eq!(value["max_completion_tokens"], 5000);
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "sys"}));
        assert_eq!(value["messages"][1]["tool_calls"][0]["function"]["name"], "analyze_pcap");
        assert!(value["messages"][1].get("content").is_none());
        assert_eq!(
            value["messages"][2],
            json!({"role": "tool", "content": "{}", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn plain_requests_omit_tool_fields() {
        let req = client("http://x/v1").build_request(&[ConversationMessage::system("s")], None);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn classifies_tool_rejections() {
        let err = classify_failure(400, "model does not support tools".into(), true);
        assert!(matches!(err, LlmError::ToolsUnsupported(_)));
        let err = classify_failure(400, "model does not support tools".into(), false);
        assert!(matches!(err, LlmError::Http { status: 400, .. }));
        let err = classify_failure(429, "quota exceeded".into(), true);
        assert!(matches!(err, LlmError::Http { status: 429, .. }));
    }

    #[test]
    fn missing_tool_call_ids_get_a_token() {
        let resp: OpenAIResponse = serde_json
            ::from_value(
                json!({
                "choices": [{"message": {"content": null, "tool_calls": [
                    {"function": {"name": "analyze_pcap", "arguments": "{}"}}
                ]}}]
            })
            )
            .unwrap();
        let completion = into_completion(resp).unwrap();
        assert_eq!(completion.content, None);
        assert!(completion.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn resolves_completion_urls_and_keys() {
        assert_eq!(completions_url("https://api.openai.com/v1/"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(completions_url("http://h/v1/chat/completions"), "http://h/v1/chat/completions");

        let mut config = LlmConfig::default();
        assert!(matches!(OpenAIChatClient::from_config(&config), Err(LlmError::Config(_))));
        config.llm_type = LlmType::Ollama;
        let ollama = OpenAIChatClient::from_config(&config).unwrap();
        assert_eq!(ollama.get_base_url().unwrap(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn parses_a_live_tool_call_response() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "o4-mini");
                Json(
                    json!({
                    "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [{
                        "id": "call_abc", "type": "function",
                        "function": {"name": "analyze_pcap", "arguments": "{\"display_filter\":\"ngap\"}"}
                    }]}}]
                })
                )
            })
        );
        let base = serve(app).await;
        let tools = [tool()];
        let completion = client(&base)
            .chat(&[ConversationMessage::text(Role::User, "hi")], Some(&tools)).await
            .unwrap();
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "call_abc");
    }

    #[tokio::test]
    async fn surfaces_tool_rejection_from_the_service() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (StatusCode::BAD_REQUEST, "{\"error\":{\"message\":\"tools is not supported\"}}")
            })
        );
        let base = serve(app).await;
        let tools = [tool()];
        let err = client(&base)
            .chat(&[ConversationMessage::text(Role::User, "hi")], Some(&tools)).await
            .unwrap_err();
        assert!(matches!(err, LlmError::ToolsUnsupported(_)));
    }

    #[tokio::test]
    async fn stalled_services_time_out() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": [{"message": {"content": "too late"}}]}))
            })
        );
        let base = serve(app).await;
        let tools = [tool()];
        let err = client_with_timeout(&base, Duration::from_millis(200))
            .chat(&[ConversationMessage::text(Role::User, "hi")], Some(&tools)).await
            .unwrap_err();
        assert!(matches!(err, LlmError::TimedOut(after) if after == Duration::from_millis(200)));
        assert_eq!(
            AnalyzerError::from(err).status(),
            axum::http::StatusCode::BAD_GATEWAY
        );
    }
}
