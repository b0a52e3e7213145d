//! The seam between the chat engine and model backends.
//!
//! A [`CompletionProvider`] turns a transcript into a lazy stream of
//! [`CompletionEvent`]s.  The [`ProviderRegistry`] maps model-name prefixes to
//! providers and is built once at startup, then shared through an `Arc`.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{Error, Result};
use crate::types::{CompletionEvent, Message};

/// A stream of completion events produced by a provider.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionEvent>> + Send>>;

/// Fully resolved parameters for a single completion request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionParams {
    /// Model identifier, e.g. `gpt-4o` or `claude-sonnet-4-20250514`.
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Extended-thinking token budget, honored by providers that support it.
    pub thinking_budget: Option<u32>,
    /// Reasoning effort (`low`, `medium`, `high`) for reasoning models.
    pub reasoning_effort: Option<String>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
}

impl CompletionParams {
    /// Create parameters for `model` with every optional field unset.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// A model backend.
///
/// Implementations report requests the backend refused as malformed with
/// [`Error::BadRequest`]; every other failure uses another variant so that the
/// session keeps the user's message around for a rerun.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Request a completion of `messages`.
    ///
    /// When `stream` is false the provider may still return a stream; it will
    /// simply carry the whole response in one delta.
    async fn complete(
        &self,
        messages: &[Message],
        params: &CompletionParams,
        stream: bool,
    ) -> Result<CompletionStream>;
}

/// Maps model-name prefixes to providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<(String, Arc<dyn CompletionProvider>)>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every model whose name starts with `prefix` to `provider`.
    ///
    /// Registering the same prefix twice replaces the earlier provider.
    pub fn register(&mut self, prefix: impl Into<String>, provider: Arc<dyn CompletionProvider>) {
        let prefix = prefix.into();
        self.entries.retain(|(existing, _)| *existing != prefix);
        self.entries.push((prefix, provider));
    }

    /// Find the provider for `model`; the longest matching prefix wins.
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn CompletionProvider>> {
        self.entries
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, provider)| Arc::clone(provider))
            .ok_or_else(|| Error::unknown_model(model, self.prefixes()))
    }

    /// The registered prefixes, in registration order.
    pub fn prefixes(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    /// Returns true if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    struct Named(&'static str);

    #[async_trait]
    impl CompletionProvider for Named {
        async fn complete(
            &self,
            _messages: &[Message],
            _params: &CompletionParams,
            _stream: bool,
        ) -> Result<CompletionStream> {
            let name = self.0;
            Ok(Box::pin(stream::once(async move {
                Ok(CompletionEvent::text(name))
            })))
        }
    }

    async fn first_text(provider: Arc<dyn CompletionProvider>) -> String {
        let mut events = provider
            .complete(&[], &CompletionParams::new("m"), true)
            .await
            .unwrap();
        match events.next().await.unwrap().unwrap() {
            CompletionEvent::MessageDelta(text) => text,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let mut registry = ProviderRegistry::new();
        registry.register("gpt", Arc::new(Named("openai")));
        registry.register("gpt-4o-special", Arc::new(Named("special")));

        let provider = registry.resolve("gpt-4o-special-2024").unwrap();
        assert_eq!(first_text(provider).await, "special");

        let provider = registry.resolve("gpt-4o").unwrap();
        assert_eq!(first_text(provider).await, "openai");
    }

    #[tokio::test]
    async fn reregistering_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register("claude", Arc::new(Named("old")));
        registry.register("claude", Arc::new(Named("new")));
        assert_eq!(registry.prefixes(), vec!["claude".to_string()]);
        let provider = registry.resolve("claude-3").unwrap();
        assert_eq!(first_text(provider).await, "new");
    }

    #[test]
    fn unknown_model_lists_prefixes() {
        let mut registry = ProviderRegistry::new();
        registry.register("gpt", Arc::new(Named("openai")));
        let err = registry.resolve("llama-3").err().unwrap();
        assert!(err.is_unknown_model());
        assert!(err.is_rejected_request());
        match err {
            Error::UnknownModel {
                model,
                known_prefixes,
            } => {
                assert_eq!(model, "llama-3");
                assert_eq!(known_prefixes, vec!["gpt".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
