//! # HttpGateway
//!
//! [`ModelGateway`] backed by an OpenAI-compatible chat-completions
//! endpoint. Streaming replies arrive as SSE; analysis calls use
//! non-streaming JSON completions.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use askly_core::{Memory, MemoryDraft, Message, Role, TopicDetection, DEFAULT_TITLE};

use crate::config::GatewayConfig;
use crate::error::{LlmError, Result};
use crate::gateway::{ModelGateway, TokenStream};
use crate::prompts;

/// Number of trailing messages sent as chat history
const HISTORY_WINDOW: usize = 20;

/// HTTP-backed model gateway
pub struct HttpGateway {
    config: GatewayConfig,
    client: Client,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "assistant",
    }
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn post(&self, request: &ChatCompletionRequest<'_>) -> Result<reqwest::Response> {
        let mut builder = self.client.post(self.endpoint()).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// One non-streaming completion, returning the reply text
    async fn complete(&self, model: &str, prompt: &str, json_response: bool) -> Result<String> {
        let request = ChatCompletionRequest {
            model,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            response_format: json_response
                .then(|| serde_json::json!({ "type": "json_object" })),
        };

        let response = self.post(&request).await?;
        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            LlmError::Parse(format!("malformed completion response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("completion response had no content".to_string()))
    }
}

/// Parse the extraction output: a draft array, possibly wrapped in an
/// object by backends forced into JSON mode
///
/// Anything else is malformed provider output and surfaces as a parse
/// failure rather than an empty result.
fn parse_drafts(text: &str) -> Result<Vec<MemoryDraft>> {
    if let Ok(drafts) = serde_json::from_str(text) {
        return Ok(drafts);
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| LlmError::Parse(format!("memory extraction output: {}", e)))?;
    let array = value
        .as_object()
        .and_then(|obj| obj.values().find(|v| v.is_array()).cloned())
        .ok_or_else(|| {
            LlmError::Parse("memory extraction output is not a draft array".to_string())
        })?;
    serde_json::from_value(array)
        .map_err(|e| LlmError::Parse(format!("memory extraction output: {}", e)))
}

/// Pull the delta text out of one SSE data payload, if any
fn delta_content(data: &str) -> Result<Option<String>> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::Stream(format!("malformed stream chunk: {}", e)))?;
    Ok(value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn stream_chat(
        &self,
        history: &[Message],
        memories: &[Memory],
        topic: Option<&str>,
    ) -> Result<TokenStream> {
        let system = prompts::build_system_instruction(memories, topic);
        let start = history.len().saturating_sub(HISTORY_WINDOW);

        let mut messages = vec![WireMessage {
            role: "system",
            content: &system,
        }];
        messages.extend(history[start..].iter().map(|m| WireMessage {
            role: wire_role(m.role),
            content: &m.content,
        }));

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            stream: true,
            response_format: None,
        };

        let response = self.post(&request).await?;
        debug!("Chat stream opened against {}", self.endpoint());

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.data.trim() == "[DONE]");
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) => match delta_content(&event.data) {
                        Ok(Some(text)) => Some(Ok(text)),
                        Ok(None) => None,
                        Err(e) => Some(Err(e)),
                    },
                    Err(e) => Some(Err(LlmError::Stream(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }

    async fn detect_topic(
        &self,
        recent: &[Message],
        current_topic: Option<&str>,
    ) -> Result<TopicDetection> {
        if recent.len() < 2 {
            return Ok(TopicDetection::unchanged());
        }

        let prompt = prompts::build_topic_prompt(recent, current_topic);
        let text = self
            .complete(&self.config.reasoning_model, &prompt, true)
            .await?;
        let detection: TopicDetection = serde_json::from_str(&text)
            .map_err(|e| LlmError::Parse(format!("topic detection output: {}", e)))?;
        Ok(detection)
    }

    async fn extract_memories(
        &self,
        user_message: &str,
        model_reply: &str,
    ) -> Result<Vec<MemoryDraft>> {
        let prompt = prompts::build_extraction_prompt(user_message, model_reply);
        let text = self
            .complete(&self.config.reasoning_model, &prompt, true)
            .await?;
        parse_drafts(&text)
    }

    async fn generate_title(&self, opening: &[Message]) -> Result<String> {
        if opening.is_empty() {
            return Ok(DEFAULT_TITLE.to_string());
        }

        let prompt = prompts::build_title_prompt(opening);
        let text = self.complete(&self.config.model, &prompt, false).await?;
        let title = text.trim();
        if title.is_empty() {
            warn!("Title generation returned empty text");
            return Ok(DEFAULT_TITLE.to_string());
        }
        Ok(title.to_string())
    }
}
