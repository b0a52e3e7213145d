//! Assistants: a persona plus the model parameters used to answer as it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{CompletionParams, CompletionStream, ProviderRegistry};
use crate::types::{Message, ModelOverrides, OverrideKey};

/// Model used when neither the assistant nor the user picks one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Temperature used when neither the assistant nor the user picks one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Top-p used when neither the assistant nor the user picks one.
pub const DEFAULT_TOP_P: f64 = 1.0;

const SYSTEM_PROMPT_GENERAL: &str = "You are a helpful assistant.";
const INIT_USER_PROMPT_DEV: &str =
    "Your responses must be short and concise. Do not include explanations unless asked.";
const SYSTEM_PROMPT_BASH: &str = "You output only valid and correct shell commands according to the user's prompt. You don't provide any explanations or any other text that is not valid shell commands.";

/// The configuration of one assistant, as written in the config file.
///
/// Every field is optional so that a user entry can be merged over a
/// built-in assistant of the same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Persona messages that start every conversation.
    pub messages: Option<Vec<Message>>,
    /// Model identifier.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Extended-thinking token budget.
    pub thinking_budget: Option<u32>,
    /// Reasoning effort for reasoning models.
    pub reasoning_effort: Option<String>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
}

impl AssistantConfig {
    /// Create a config with only persona messages set.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    /// Layer `other` over `self`; fields set in `other` win.
    pub fn merge(&self, other: &AssistantConfig) -> AssistantConfig {
        AssistantConfig {
            messages: other.messages.clone().or_else(|| self.messages.clone()),
            model: other.model.clone().or_else(|| self.model.clone()),
            temperature: other.temperature.or(self.temperature),
            top_p: other.top_p.or(self.top_p),
            thinking_budget: other.thinking_budget.or(self.thinking_budget),
            reasoning_effort: other
                .reasoning_effort
                .clone()
                .or_else(|| self.reasoning_effort.clone()),
            max_tokens: other.max_tokens.or(self.max_tokens),
        }
    }
}

fn system_prompt_dev() -> String {
    format!(
        "You are a helpful assistant who is an expert in software development. \
         You are helping a user who is a software developer. Your responses are short and concise. \
         You include code snippets when appropriate. Code snippets are formatted using Markdown \
         with a correct language tag. User's system: {} {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY,
    )
}

/// The assistants available without any configuration.
pub fn default_assistants() -> BTreeMap<String, AssistantConfig> {
    let mut assistants = BTreeMap::new();
    assistants.insert(
        "general".to_string(),
        AssistantConfig::with_messages(vec![Message::system(SYSTEM_PROMPT_GENERAL)]),
    );
    assistants.insert(
        "dev".to_string(),
        AssistantConfig::with_messages(vec![
            Message::system(system_prompt_dev()),
            Message::user(INIT_USER_PROMPT_DEV),
        ]),
    );
    assistants.insert(
        "bash".to_string(),
        AssistantConfig {
            temperature: Some(0.0),
            ..AssistantConfig::with_messages(vec![Message::system(SYSTEM_PROMPT_BASH)])
        },
    );
    assistants
}

/// Command-line settings that apply on top of the chosen assistant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantGlobalArgs {
    /// Name of the assistant to use.
    pub assistant_name: String,
    /// Model override.
    pub model: Option<String>,
    /// Temperature override.
    pub temperature: Option<f64>,
    /// Top-p override.
    pub top_p: Option<f64>,
    /// Thinking budget override.
    pub thinking_budget: Option<u32>,
}

/// Resolve the named assistant and apply command-line overrides.
///
/// A user-defined assistant with the same name as a built-in one is merged
/// over it.
pub fn init_assistant(
    args: &AssistantGlobalArgs,
    custom_assistants: &BTreeMap<String, AssistantConfig>,
    registry: Arc<ProviderRegistry>,
) -> Result<Assistant> {
    let name = &args.assistant_name;
    let mut builtin = default_assistants();
    let config = match (builtin.remove(name), custom_assistants.get(name)) {
        (Some(base), Some(custom)) => base.merge(custom),
        (Some(base), None) => base,
        (None, Some(custom)) => custom.clone(),
        (None, None) => {
            let mut known: Vec<&str> = builtin
                .keys()
                .chain(custom_assistants.keys())
                .map(String::as_str)
                .collect();
            known.sort_unstable();
            known.dedup();
            return Err(Error::config(format!(
                "unknown assistant {name:?}; choose one of: {}",
                known.join(", ")
            )));
        }
    };

    let config = config.merge(&AssistantConfig {
        model: args.model.clone(),
        temperature: args.temperature,
        top_p: args.top_p,
        thinking_budget: args.thinking_budget,
        ..AssistantConfig::default()
    });
    tracing::info!(assistant = %name, ?config, "initialized assistant");
    Ok(Assistant::new(config, registry))
}

/// What the chat session needs from an assistant.
#[async_trait]
pub trait ChatAssistant: Send + Sync {
    /// A fresh copy of the persona messages.
    fn init_messages(&self) -> Vec<Message>;

    /// The per-turn override keys this assistant honors.
    fn supported_overrides(&self) -> &[OverrideKey];

    /// Request a completion of `messages` with `overrides` applied.
    async fn complete_chat(
        &self,
        messages: &[Message],
        overrides: &ModelOverrides,
        stream: bool,
    ) -> Result<CompletionStream>;
}

/// An assistant backed by a provider registry.
#[derive(Debug, Clone)]
pub struct Assistant {
    config: AssistantConfig,
    registry: Arc<ProviderRegistry>,
}

impl Assistant {
    /// Create an assistant from its configuration.
    pub fn new(config: AssistantConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self { config, registry }
    }

    /// The merged configuration.
    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Resolve every parameter: override, then assistant config, then default.
    pub fn resolve_params(&self, overrides: &ModelOverrides) -> CompletionParams {
        CompletionParams {
            model: overrides
                .model
                .clone()
                .or_else(|| self.config.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: Some(
                overrides
                    .temperature
                    .or(self.config.temperature)
                    .unwrap_or(DEFAULT_TEMPERATURE),
            ),
            top_p: Some(
                overrides
                    .top_p
                    .or(self.config.top_p)
                    .unwrap_or(DEFAULT_TOP_P),
            ),
            thinking_budget: overrides.thinking_budget.or(self.config.thinking_budget),
            reasoning_effort: self.config.reasoning_effort.clone(),
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl ChatAssistant for Assistant {
    fn init_messages(&self) -> Vec<Message> {
        self.config.messages.clone().unwrap_or_default()
    }

    fn supported_overrides(&self) -> &[OverrideKey] {
        OverrideKey::ALL
    }

    async fn complete_chat(
        &self,
        messages: &[Message],
        overrides: &ModelOverrides,
        stream: bool,
    ) -> Result<CompletionStream> {
        let params = self.resolve_params(overrides);
        let provider = self.registry.resolve(&params.model)?;
        tracing::debug!(model = %params.model, ?params, "completing chat");
        provider.complete(messages, &params, stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CompletionProvider;
    use crate::types::CompletionEvent;
    use futures::StreamExt;
    use futures::stream;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        params: Mutex<Vec<CompletionParams>>,
    }

    #[async_trait]
    impl CompletionProvider for Recording {
        async fn complete(
            &self,
            _messages: &[Message],
            params: &CompletionParams,
            _stream: bool,
        ) -> Result<CompletionStream> {
            self.params.lock().unwrap().push(params.clone());
            Ok(Box::pin(stream::iter(vec![Ok(CompletionEvent::text("ok"))])))
        }
    }

    fn registry_with(provider: Arc<Recording>) -> Arc<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        registry.register("gpt", provider.clone());
        registry.register("claude", provider);
        Arc::new(registry)
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let assistant = Assistant::new(AssistantConfig::default(), Arc::new(ProviderRegistry::new()));
        let params = assistant.resolve_params(&ModelOverrides::default());
        assert_eq!(params.model, DEFAULT_MODEL);
        assert_eq!(params.temperature, Some(DEFAULT_TEMPERATURE));
        assert_eq!(params.top_p, Some(DEFAULT_TOP_P));
        assert_eq!(params.thinking_budget, None);
    }

    #[test]
    fn override_beats_config_beats_default() {
        let config = AssistantConfig {
            model: Some("gpt-4".to_string()),
            temperature: Some(0.2),
            ..AssistantConfig::default()
        };
        let assistant = Assistant::new(config, Arc::new(ProviderRegistry::new()));
        let overrides = ModelOverrides {
            temperature: Some(1.5),
            ..ModelOverrides::default()
        };
        let params = assistant.resolve_params(&overrides);
        assert_eq!(params.model, "gpt-4");
        assert_eq!(params.temperature, Some(1.5));
        assert_eq!(params.top_p, Some(DEFAULT_TOP_P));
    }

    #[test]
    fn init_messages_is_a_fresh_copy() {
        let assistant = Assistant::new(
            AssistantConfig::with_messages(vec![Message::system("S")]),
            Arc::new(ProviderRegistry::new()),
        );
        let mut first = assistant.init_messages();
        first.push(Message::user("mutated"));
        assert_eq!(assistant.init_messages(), vec![Message::system("S")]);
    }

    #[tokio::test]
    async fn complete_chat_routes_by_model() {
        let provider = Arc::new(Recording::default());
        let assistant = Assistant::new(AssistantConfig::default(), registry_with(provider.clone()));
        let overrides = ModelOverrides {
            model: Some("claude-3-opus".to_string()),
            ..ModelOverrides::default()
        };
        let mut events = assistant
            .complete_chat(&[Message::user("hi")], &overrides, true)
            .await
            .unwrap();
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            CompletionEvent::text("ok")
        );
        assert_eq!(provider.params.lock().unwrap()[0].model, "claude-3-opus");
    }

    #[tokio::test]
    async fn complete_chat_unknown_model() {
        let provider = Arc::new(Recording::default());
        let assistant = Assistant::new(AssistantConfig::default(), registry_with(provider.clone()));
        let overrides = ModelOverrides {
            model: Some("llama-3".to_string()),
            ..ModelOverrides::default()
        };
        let err = assistant
            .complete_chat(&[Message::user("hi")], &overrides, true)
            .await
            .err()
            .unwrap();
        assert!(err.is_unknown_model());
        assert!(provider.params.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_assistant_merges_over_builtin() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "general".to_string(),
            AssistantConfig {
                model: Some("gpt-4o".to_string()),
                ..AssistantConfig::default()
            },
        );
        let args = AssistantGlobalArgs {
            assistant_name: "general".to_string(),
            temperature: Some(0.1),
            ..AssistantGlobalArgs::default()
        };
        let assistant = init_assistant(&args, &custom, Arc::new(ProviderRegistry::new())).unwrap();
        assert_eq!(
            assistant.init_messages(),
            vec![Message::system(SYSTEM_PROMPT_GENERAL)]
        );
        assert_eq!(assistant.config().model.as_deref(), Some("gpt-4o"));
        assert_eq!(assistant.config().temperature, Some(0.1));
    }

    #[test]
    fn custom_only_assistant() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "pirate".to_string(),
            AssistantConfig::with_messages(vec![Message::system("Arr.")]),
        );
        let args = AssistantGlobalArgs {
            assistant_name: "pirate".to_string(),
            ..AssistantGlobalArgs::default()
        };
        let assistant = init_assistant(&args, &custom, Arc::new(ProviderRegistry::new())).unwrap();
        assert_eq!(assistant.init_messages(), vec![Message::system("Arr.")]);
    }

    #[test]
    fn unknown_assistant_is_a_config_error() {
        let args = AssistantGlobalArgs {
            assistant_name: "nobody".to_string(),
            ..AssistantGlobalArgs::default()
        };
        let err = init_assistant(&args, &BTreeMap::new(), Arc::new(ProviderRegistry::new()))
            .err()
            .unwrap();
        let text = err.to_string();
        assert!(text.contains("nobody"));
        assert!(text.contains("bash, dev, general"));
    }

    #[test]
    fn dev_assistant_has_priming_message() {
        let dev = default_assistants().remove("dev").unwrap();
        let messages = dev.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains(std::env::consts::OS));
        assert!(messages[1].is_user());
    }

    #[test]
    fn config_from_yaml() {
        let config: AssistantConfig = serde_yaml::from_str(
            "model: claude-3-7-sonnet-latest\nthinking_budget: 2048\nmessages:\n  - role: system\n    content: Be brief.\n",
        )
        .unwrap();
        assert_eq!(config.model.as_deref(), Some("claude-3-7-sonnet-latest"));
        assert_eq!(config.thinking_budget, Some(2048));
        assert_eq!(config.messages, Some(vec![Message::system("Be brief.")]));
        assert_eq!(config.temperature, None);
    }
}
