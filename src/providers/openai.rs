use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client as ReqwestClient;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::{STREAM_ERRORS, STREAM_EVENTS};
use crate::pricing::{openai_pricing, xai_pricing};
use crate::provider::{CompletionParams, CompletionProvider, CompletionStream};
use crate::sse::{SseFrame, process_sse};
use crate::types::{CompletionEvent, Message, Pricing, UsageEvent};

use super::{DEFAULT_TIMEOUT, ErrorDetail, error_from_stream, http_client, post_json, secret_header};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const XAI_BASE_URL: &str = "https://api.x.ai/v1/";

/// A provider for the OpenAI chat completions API and compatible services.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    pricing: fn(&str) -> Option<Pricing>,
}

impl OpenAiProvider {
    /// Create a provider talking to OpenAI, or to `base_url` when given.
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Result<Self> {
        Self::with_options(
            api_key,
            base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            DEFAULT_TIMEOUT,
            openai_pricing,
        )
    }

    /// Create a provider talking to xAI's OpenAI-compatible endpoint.
    pub fn xai(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, XAI_BASE_URL.to_string(), DEFAULT_TIMEOUT, xai_pricing)
    }

    /// Create a provider with every setting spelled out.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: String,
        timeout: Duration,
        pricing: fn(&str) -> Option<Pricing>,
    ) -> Result<Self> {
        let mut base_url = base_url;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        url::Url::parse(&base_url)?;
        Ok(Self {
            api_key: api_key.into(),
            client: http_client(timeout)?,
            base_url,
            timeout,
            pricing,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            secret_header(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("colloquy"));
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl<'a> ChatRequest<'a> {
    fn new(messages: &'a [Message], params: &'a CompletionParams, stream: bool) -> Self {
        Self {
            model: &params.model,
            messages,
            stream,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            reasoning_effort: params.reasoning_effort.as_deref(),
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolCall {
    #[serde(default)]
    function: Option<FunctionCall>,
}

/// Either a streamed `delta` or a complete `message`; they share a shape.
#[derive(Debug, Default, Deserialize)]
struct Content {
    content: Option<String>,
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default, alias = "message")]
    delta: Content,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    error: Option<ErrorDetail>,
}

impl ChatChunk {
    /// Flatten one chunk into completion events.
    fn into_events(self, model: &str, pricing: fn(&str) -> Option<Pricing>) -> Vec<Result<CompletionEvent>> {
        if let Some(error) = self.error {
            return vec![Err(error_from_stream(error))];
        }
        let mut events = Vec::new();
        for choice in self.choices {
            let delta = choice.delta;
            if let Some(thinking) = delta.reasoning_content
                && !thinking.is_empty()
            {
                events.push(Ok(CompletionEvent::ThinkingDelta(thinking)));
            }
            if let Some(text) = delta.content
                && !text.is_empty()
            {
                events.push(Ok(CompletionEvent::MessageDelta(text)));
            }
            for call in delta.tool_calls {
                let Some(function) = call.function else {
                    continue;
                };
                let name = function.name.unwrap_or_default();
                let arguments = function.arguments.unwrap_or_default();
                if !name.is_empty() || !arguments.is_empty() {
                    events.push(Ok(CompletionEvent::ToolCall { name, arguments }));
                }
            }
        }
        if let Some(usage) = self.usage {
            events.push(Ok(CompletionEvent::Usage(UsageEvent::with_pricing(
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens,
                pricing(model),
            ))));
        }
        events
    }
}

fn decode_frame(
    frame: Result<SseFrame>,
    model: &str,
    pricing: fn(&str) -> Option<Pricing>,
) -> Vec<Result<CompletionEvent>> {
    let frame = match frame {
        Ok(frame) => frame,
        Err(err) => {
            STREAM_ERRORS.click();
            return vec![Err(err)];
        }
    };
    STREAM_EVENTS.click();
    match serde_json::from_str::<ChatChunk>(&frame.data) {
        Ok(chunk) => chunk.into_events(model, pricing),
        Err(e) => {
            STREAM_ERRORS.click();
            vec![Err(Error::serialization(
                format!("Failed to parse stream chunk: {e}"),
                Some(Box::new(e)),
            ))]
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        params: &CompletionParams,
        stream: bool,
    ) -> Result<CompletionStream> {
        let url = format!("{}chat/completions", self.base_url);
        let request = ChatRequest::new(messages, params, stream);
        tracing::debug!(model = %params.model, stream, messages = messages.len(), "openai request");

        let response =
            post_json(&self.client, &url, self.headers()?, &request, stream, self.timeout).await?;

        let model = params.model.clone();
        let pricing = self.pricing;
        if stream {
            let frames = process_sse(response.bytes_stream())
                .take_while(|frame| {
                    let done = matches!(frame, Ok(frame) if frame.is_done());
                    futures::future::ready(!done)
                })
                .flat_map(move |frame| stream::iter(decode_frame(frame, &model, pricing)));
            Ok(Box::pin(frames))
        } else {
            let chunk = response.json::<ChatChunk>().await.map_err(|e| {
                Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
            })?;
            Ok(Box::pin(stream::iter(chunk.into_events(&model, pricing))))
        }
    }
}
