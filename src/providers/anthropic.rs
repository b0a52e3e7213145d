use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client as ReqwestClient;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::{STREAM_ERRORS, STREAM_EVENTS};
use crate::pricing::claude_pricing;
use crate::provider::{CompletionParams, CompletionProvider, CompletionStream};
use crate::sse::{SseFrame, process_sse};
use crate::types::{CompletionEvent, Message, Role, UsageEvent};

use super::{DEFAULT_TIMEOUT, ErrorDetail, error_from_stream, http_client, post_json, secret_header};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Response tokens requested when nothing else is configured.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Largest `max_tokens` the messages API accepts.
pub const MAX_TOKENS_LIMIT: u32 = 64_000;

/// A provider for the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl AnthropicProvider {
    /// Create a provider talking to Anthropic, or to `base_url` when given.
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Result<Self> {
        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        url::Url::parse(&base_url)?;
        Ok(Self {
            api_key: api_key.into(),
            client: http_client(DEFAULT_TIMEOUT)?,
            base_url,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", secret_header(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_API_VERSION),
        );
        Ok(headers)
    }
}

/// Returns true if `model` accepts an extended-thinking budget.
pub fn supports_thinking(model: &str) -> bool {
    model.contains("claude-3-7")
        || model.contains("sonnet-4")
        || model.contains("opus-4")
        || model.contains("haiku-4")
}

/// Room for the thinking budget plus a normal-sized answer, capped at the API limit.
pub fn max_tokens_for_budget(budget: u32) -> u32 {
    let response_tokens = DEFAULT_MAX_TOKENS.min(MAX_TOKENS_LIMIT.saturating_sub(budget));
    budget
        .saturating_add(response_tokens)
        .min(MAX_TOKENS_LIMIT)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<&'a Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    stream: bool,
}

impl<'a> MessagesRequest<'a> {
    fn new(messages: &'a [Message], params: &'a CompletionParams, stream: bool) -> Self {
        // The messages API only takes system text in a separate field.
        let (system, messages): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);
        let system = (!system.is_empty()).then(|| {
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });

        let budget = params
            .thinking_budget
            .filter(|_| supports_thinking(&params.model));
        match budget {
            Some(budget) => Self {
                model: &params.model,
                max_tokens: max_tokens_for_budget(budget),
                messages,
                system,
                // Extended thinking requires temperature 1 and no top_p.
                temperature: Some(1.0),
                top_p: None,
                thinking: Some(ThinkingConfig {
                    kind: "enabled",
                    budget_tokens: budget,
                }),
                stream,
            },
            None => Self {
                model: &params.model,
                max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                messages,
                system,
                temperature: params.temperature,
                top_p: params.top_p,
                thinking: None,
                stream,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { content_block: ContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: BlockDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Usage,
    },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

fn usage_event(model: &str, input_tokens: u64, output_tokens: u64) -> CompletionEvent {
    CompletionEvent::Usage(UsageEvent::with_pricing(
        input_tokens,
        output_tokens,
        input_tokens + output_tokens,
        claude_pricing(model),
    ))
}

/// Turn one stream event into completion events, tracking prompt tokens across calls.
fn decode_event(
    frame: Result<SseFrame>,
    model: &str,
    input_tokens: &mut u64,
) -> Vec<Result<CompletionEvent>> {
    let frame = match frame {
        Ok(frame) => frame,
        Err(err) => {
            STREAM_ERRORS.click();
            return vec![Err(err)];
        }
    };
    STREAM_EVENTS.click();
    let event = match serde_json::from_str::<StreamEvent>(&frame.data) {
        Ok(event) => event,
        Err(e) => {
            STREAM_ERRORS.click();
            return vec![Err(Error::serialization(
                format!("Failed to parse stream event: {e}"),
                Some(Box::new(e)),
            ))];
        }
    };
    match event {
        StreamEvent::MessageStart { message } => {
            *input_tokens = message.usage.input_tokens;
            vec![]
        }
        StreamEvent::ContentBlockStart {
            content_block: ContentBlock::ToolUse { name, .. },
        } => vec![Ok(CompletionEvent::ToolCall {
            name,
            arguments: String::new(),
        })],
        StreamEvent::ContentBlockStart { .. } => vec![],
        StreamEvent::ContentBlockDelta { delta } => match delta {
            BlockDelta::Text { text } => vec![Ok(CompletionEvent::MessageDelta(text))],
            BlockDelta::Thinking { thinking } => vec![Ok(CompletionEvent::ThinkingDelta(thinking))],
            BlockDelta::InputJson { partial_json } => vec![Ok(CompletionEvent::ToolCall {
                name: String::new(),
                arguments: partial_json,
            })],
            BlockDelta::Other => vec![],
        },
        StreamEvent::MessageDelta { usage } => {
            vec![Ok(usage_event(model, *input_tokens, usage.output_tokens))]
        }
        StreamEvent::Error { error } => {
            STREAM_ERRORS.click();
            vec![Err(error_from_stream(error))]
        }
        StreamEvent::Other => vec![],
    }
}

impl MessageResponse {
    fn into_events(self, model: &str) -> Vec<Result<CompletionEvent>> {
        let mut text = String::new();
        let mut events = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text: chunk } => text.push_str(&chunk),
                ContentBlock::Thinking { thinking } => {
                    events.push(Ok(CompletionEvent::ThinkingDelta(thinking)))
                }
                ContentBlock::ToolUse { name, input } => events.push(Ok(CompletionEvent::ToolCall {
                    name,
                    arguments: input.to_string(),
                })),
                ContentBlock::Other => {}
            }
        }
        events.push(Ok(CompletionEvent::MessageDelta(text)));
        events.push(Ok(usage_event(
            model,
            self.usage.input_tokens,
            self.usage.output_tokens,
        )));
        events
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[Message],
        params: &CompletionParams,
        stream: bool,
    ) -> Result<CompletionStream> {
        let url = format!("{}messages", self.base_url);
        let request = MessagesRequest::new(messages, params, stream);
        tracing::debug!(
            model = %params.model,
            stream,
            thinking = request.thinking.is_some(),
            max_tokens = request.max_tokens,
            "anthropic request"
        );

        let response =
            post_json(&self.client, &url, self.headers()?, &request, stream, self.timeout).await?;

        let model = params.model.clone();
        if stream {
            let events = process_sse(response.bytes_stream())
                .scan(0u64, move |input_tokens, frame| {
                    futures::future::ready(Some(decode_event(frame, &model, input_tokens)))
                })
                .flat_map(stream::iter);
            Ok(Box::pin(events))
        } else {
            let message = response.json::<MessageResponse>().await.map_err(|e| {
                Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
            })?;
            Ok(Box::pin(stream::iter(message.into_events(&model))))
        }
    }
}
