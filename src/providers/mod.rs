//! HTTP bindings for the supported model backends.
//!
//! Both backends share the request path: POST a JSON body, map non-2xx
//! responses onto [`Error`] variants, and hand successful streaming responses
//! to the SSE decoder.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::{Deserialize, Serialize};

use crate::chat::config::AppConfig;
use crate::error::{Error, Result};
use crate::observability::{PROVIDER_REQUEST_DURATION, PROVIDER_REQUEST_ERRORS, PROVIDER_REQUESTS};
use crate::provider::ProviderRegistry;

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Default timeout for a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Model-name prefixes served by the OpenAI chat completions API.
pub const OPENAI_PREFIXES: &[&str] = &["gpt", "chatgpt", "o1", "o3", "o4"];
/// Model-name prefixes served by the Anthropic messages API.
pub const ANTHROPIC_PREFIXES: &[&str] = &["claude"];
/// Model-name prefixes served by xAI.
pub const XAI_PREFIXES: &[&str] = &["grok"];

/// Build a registry with a provider for every backend that has an API key.
pub fn registry_from_config(config: &AppConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    if let Some(key) = &config.openai_api_key {
        let provider = Arc::new(OpenAiProvider::new(
            key.clone(),
            config.openai_base_url.clone(),
        )?);
        for prefix in OPENAI_PREFIXES {
            registry.register(*prefix, provider.clone());
        }
    }
    if let Some(key) = &config.anthropic_api_key {
        let provider = Arc::new(AnthropicProvider::new(key.clone(), None)?);
        for prefix in ANTHROPIC_PREFIXES {
            registry.register(*prefix, provider.clone());
        }
    }
    if let Some(key) = &config.xai_api_key {
        let provider = Arc::new(OpenAiProvider::xai(key.clone())?);
        for prefix in XAI_PREFIXES {
            registry.register(*prefix, provider.clone());
        }
    }

    if registry.is_empty() {
        tracing::warn!("no provider API keys configured");
    }
    Ok(registry)
}

/// Build the HTTP client shared by every request of one provider.
pub(crate) fn http_client(timeout: Duration) -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })
}

/// Convert a secret into a header value.
pub(crate) fn secret_header(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| Error::config("API key contains characters not allowed in a header"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// POST `body` to `url` and return the response if it was successful.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &ReqwestClient,
    url: &str,
    mut headers: HeaderMap,
    body: &B,
    stream: bool,
    timeout: Duration,
) -> Result<Response> {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::ACCEPT,
        if stream {
            HeaderValue::from_static("text/event-stream")
        } else {
            HeaderValue::from_static("application/json")
        },
    );

    PROVIDER_REQUESTS.click();
    let start = Instant::now();
    let result = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| map_request_error(e, timeout));
    PROVIDER_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            PROVIDER_REQUEST_ERRORS.click();
            tracing::warn!(url, error = %err, "request failed");
            return Err(err);
        }
    };

    if !response.status().is_success() {
        PROVIDER_REQUEST_ERRORS.click();
        let err = error_from_response(response).await;
        tracing::warn!(url, error = %err, "provider returned an error");
        return Err(err);
    }
    Ok(response)
}

/// Classify a transport-level failure.
pub(crate) fn map_request_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::timeout(
            format!("Request timed out: {e}"),
            Some(timeout.as_secs_f64()),
        )
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

/// Convert a non-2xx response into an error.
pub(crate) async fn error_from_response(response: Response) -> Error {
    let status_code = response.status().as_u16();

    let request_id = response
        .headers()
        .get("x-request-id")
        .or_else(|| response.headers().get("request-id"))
        .and_then(|val| val.to_str().ok())
        .map(String::from);

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    error_from_status(status_code, &body, request_id, retry_after)
}

/// Map an HTTP status and its body onto an error variant.
pub(crate) fn error_from_status(
    status_code: u16,
    body: &str,
    request_id: Option<String>,
    retry_after: Option<u64>,
) -> Error {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_default();
    let message = detail.message.unwrap_or_else(|| body.to_string());

    match status_code {
        400 => Error::bad_request(message, detail.param),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message, request_id),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, detail.error_type, message, request_id),
    }
}

/// Map an error reported inside an event stream, keyed by its type string.
pub(crate) fn error_from_stream(detail: ErrorDetail) -> Error {
    let message = detail
        .message
        .unwrap_or_else(|| "provider reported an error".to_string());
    match detail.error_type.as_deref() {
        Some("invalid_request_error") => Error::bad_request(message, detail.param),
        Some("authentication_error") => Error::authentication(message),
        Some("permission_error") => Error::permission(message),
        Some("not_found_error") => Error::not_found(message),
        Some("rate_limit_error") => Error::rate_limit(message, None),
        Some("overloaded_error") => Error::service_unavailable(message, None),
        Some("api_error") => Error::internal_server(message, None),
        _ => Error::streaming(message, None),
    }
}
