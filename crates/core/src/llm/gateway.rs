use crate::config::Settings;
use crate::llm::error::{GatewayStatus, LlmDiagnosticsError};
use crate::llm::{GenerateRequest, Generation, InlineImage, LlmClient, Provider, ToolSpec};
use anyhow::Context;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://ai.gateway.lovable.dev";
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// OpenAI-compatible chat-completions gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GatewayClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_llm_gateway_api_key()?.to_string();
        let base_url =
            std::env::var("LLM_GATEWAY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let temperature = std::env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            temperature,
        })
    }

    async fn create_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> anyhow::Result<ChatCompletionResponse> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .context("LLM gateway request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read LLM gateway response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            tracing::error!(%status, body = %text, "LLM gateway returned an error status");
            return Err(LlmDiagnosticsError {
                provider: Provider::Gateway,
                stage: "http",
                status: GatewayStatus::from_http(status),
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        serde_json::from_str::<ChatCompletionResponse>(&text).map_err(|e| {
            LlmDiagnosticsError::parse(
                Provider::Gateway,
                "decode_response",
                format!("failed to decode chat completion: {e}"),
                text,
            )
            .into()
        })
    }

    fn build_request(&self, request: &GenerateRequest) -> ChatCompletionRequest {
        let user_content = match &request.image {
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: request.user.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url(image),
                    },
                },
            ]),
            None => MessageContent::Text(request.user.clone()),
        };

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message {
            role: "system",
            content: MessageContent::Text(request.system.clone()),
        });
        messages.extend(request.history.iter().map(|turn| Message {
            role: turn.role.as_str(),
            content: MessageContent::Text(turn.content.clone()),
        }));
        messages.push(Message {
            role: "user",
            content: user_content,
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            tools: request.tool.as_ref().map(|t| vec![Tool::from_spec(t)]),
            tool_choice: request.tool.as_ref().map(|t| ToolChoice {
                kind: "function",
                function: ToolChoiceFunction { name: t.name },
            }),
        }
    }

    fn into_generation(res: ChatCompletionResponse) -> anyhow::Result<Generation> {
        let Some(choice) = res.choices.into_iter().next() else {
            return Err(LlmDiagnosticsError::parse(
                Provider::Gateway,
                "empty_choices",
                "chat completion contained no choices".to_string(),
                String::new(),
            )
            .into());
        };

        // Tool output path.
        if let Some(call) = choice.message.tool_calls.into_iter().flatten().next() {
            let arguments = serde_json::from_str::<serde_json::Value>(&call.function.arguments)
                .unwrap_or(serde_json::Value::String(call.function.arguments));
            return Ok(Generation::ToolCall {
                name: call.function.name,
                arguments,
            });
        }

        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(Generation::Text(text)),
            _ => Err(LlmDiagnosticsError::parse(
                Provider::Gateway,
                "empty_message",
                format!(
                    "chat completion had neither content nor tool calls (finish_reason={:?})",
                    choice.finish_reason
                ),
                String::new(),
            )
            .into()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for GatewayClient {
    fn provider(&self) -> Provider {
        Provider::Gateway
    }

    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<Generation> {
        let req = self.build_request(&request);
        let res = self.create_completion(&req).await?;
        Self::into_generation(res)
    }
}

fn data_url(image: &InlineImage) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
    format!("data:{};base64,{encoded}", image.mime_type)
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolFunction,
}

impl Tool {
    fn from_spec(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: ToolFunction {
                name: spec.name,
                description: spec.description,
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ToolFunction {
    name: &'static str,
    description: &'static str,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolChoiceFunction,
}

#[derive(Debug, Clone, Serialize)]
struct ToolChoiceFunction {
    name: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}
