//! Configuration types for the chat application.
//!
//! Command-line arguments are parsed with `arrrg`; the config file is YAML.
//! Values on the command line win over the config file, which wins over the
//! environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use serde_yaml::value::Tag;

use crate::assistant::{AssistantConfig, AssistantGlobalArgs};
use crate::error::{Error, Result};

/// Command-line arguments for the colloquy tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model override for the whole session.
    #[arrrg(optional, "Model to use; overrides the assistant's model", "MODEL")]
    pub model: Option<String>,

    /// Temperature override for the whole session.
    #[arrrg(optional, "Sampling temperature between 0 and 2", "TEMPERATURE")]
    pub temperature: Option<String>,

    /// Top-p override for the whole session.
    #[arrrg(optional, "Nucleus sampling between 0 and 1", "TOP_P")]
    pub top_p: Option<String>,

    /// Thinking budget override for the whole session.
    #[arrrg(optional, "Extended-thinking token budget", "TOKENS")]
    pub thinking_budget: Option<u32>,

    /// Path of the config file.
    #[arrrg(optional, "Config file (default: ~/.config/colloquy/colloquy.yml)", "PATH")]
    pub config: Option<String>,

    /// Log destination.
    #[arrrg(optional, "Write logs to this file; supports strftime codes", "PATH")]
    pub log_file: Option<String>,

    /// Log verbosity.
    #[arrrg(optional, "Log level: error, warn, info, debug or trace", "LEVEL")]
    pub log_level: Option<String>,

    /// One-shot prompt.
    #[arrrg(optional, "Print the response to this prompt and exit; '-' reads stdin", "TEXT")]
    pub prompt: Option<String>,

    /// One-shot shell command request.
    #[arrrg(optional, "Ask for a shell command, edit it in $EDITOR, then run it; '-' reads stdin", "TEXT")]
    pub execute: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Hide token counts and prices.
    #[arrrg(flag, "Do not print token usage and price")]
    pub no_price: bool,

    /// Request whole responses instead of streaming.
    #[arrrg(flag, "Wait for the whole response instead of streaming it")]
    pub no_stream: bool,
}

impl ChatArgs {
    /// The assistant-level settings, for the assistant called `assistant_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a sampling value is not a number in
    /// range, or if both `--prompt` and `--execute` are given.
    pub fn global_args(&self, assistant_name: impl Into<String>) -> Result<AssistantGlobalArgs> {
        if self.prompt.is_some() && self.execute.is_some() {
            return Err(Error::invalid_argument(
                "--prompt and --execute are mutually exclusive; specify only one of them",
                Some("execute".to_string()),
            ));
        }
        Ok(AssistantGlobalArgs {
            assistant_name: assistant_name.into(),
            model: self.model.clone(),
            temperature: check_range("temperature", self.temperature.as_deref(), 0.0, 2.0)?,
            top_p: check_range("top_p", self.top_p.as_deref(), 0.0, 1.0)?,
            thinking_budget: self.thinking_budget,
        })
    }
}

fn check_range(name: &str, value: Option<&str>, min: f64, max: f64) -> Result<Option<f64>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= min && v <= max => Ok(Some(v)),
        _ => Err(Error::invalid_argument(
            format!("--{name} expects a value between {min} and {max}"),
            Some(name.to_string()),
        )),
    }
}

/// Settings read from the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Assistant used when none is named on the command line.
    pub default_assistant: String,
    /// Print token usage and price after each response.
    pub show_price: bool,
    /// Style terminal output with ANSI escapes.
    pub use_color: bool,
    /// Stream responses token by token.
    pub stream: bool,
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
    /// Base URL for an OpenAI-compatible endpoint.
    pub openai_base_url: Option<String>,
    /// Anthropic API key.
    pub anthropic_api_key: Option<String>,
    /// xAI API key.
    pub xai_api_key: Option<String>,
    /// Log file; supports strftime codes.
    pub log_file: Option<String>,
    /// Log level.
    pub log_level: String,
    /// User-defined assistants, merged over the built-in ones by name.
    pub assistants: BTreeMap<String, AssistantConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_assistant: "general".to_string(),
            show_price: true,
            use_color: true,
            stream: true,
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: None,
            xai_api_key: None,
            log_file: None,
            log_level: "info".to_string(),
            assistants: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load the config file named by `explicit`, or the first one found in
    /// the default locations, then fill unset API keys from the environment.
    ///
    /// An explicitly named file must exist; the default locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => config_file_paths().into_iter().find(|path| path.is_file()),
        };
        let mut config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "reading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read and parse a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&contents, base_dir)
    }

    /// Parse YAML, resolving `!include` tags relative to `base_dir`.
    pub fn from_yaml_str(contents: &str, base_dir: &Path) -> Result<Self> {
        let value: Value = serde_yaml::from_str(contents)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        let value = resolve_includes(value, base_dir)?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// Fill every unset API key from `lookup`, keyed by environment variable name.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<String>, name: &str| {
            if slot.is_none() {
                *slot = lookup(name).filter(|value| !value.is_empty());
            }
        };
        fill(&mut self.openai_api_key, "OPENAI_API_KEY");
        fill(&mut self.openai_base_url, "OPENAI_BASE_URL");
        fill(&mut self.anthropic_api_key, "ANTHROPIC_API_KEY");
        fill(&mut self.xai_api_key, "XAI_API_KEY");
    }
}

/// Replace every `!include path` node with the contents of that file.
fn resolve_includes(value: Value, base_dir: &Path) -> Result<Value> {
    match value {
        Value::Tagged(tagged) if tagged.tag == Tag::new("!include") => {
            let Value::String(relative) = tagged.value else {
                return Err(Error::config("!include expects a file path"));
            };
            let path = base_dir.join(relative);
            let contents = fs::read_to_string(&path).map_err(|err| {
                Error::io(format!("failed to include {}", path.display()), err)
            })?;
            Ok(Value::String(contents))
        }
        Value::Tagged(mut tagged) => {
            let inner = std::mem::take(&mut tagged.value);
            tagged.value = resolve_includes(inner, base_dir)?;
            Ok(Value::Tagged(tagged))
        }
        Value::Mapping(mapping) => {
            let mut resolved = serde_yaml::Mapping::with_capacity(mapping.len());
            for (key, value) in mapping {
                resolved.insert(key, resolve_includes(value, base_dir)?);
            }
            Ok(Value::Mapping(resolved))
        }
        Value::Sequence(sequence) => Ok(Value::Sequence(
            sequence
                .into_iter()
                .map(|value| resolve_includes(value, base_dir))
                .collect::<Result<_>>()?,
        )),
        other => Ok(other),
    }
}

fn config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".config").join("colloquy"))
}

/// The default config file locations, in priority order.
pub fn config_file_paths() -> Vec<PathBuf> {
    let Some(dirs) = BaseDirs::new() else {
        return Vec::new();
    };
    vec![
        dirs.home_dir()
            .join(".config")
            .join("colloquy")
            .join("colloquy.yml"),
        dirs.home_dir().join(".colloquyrc"),
    ]
}

/// Where the line editor keeps its history.
pub fn history_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("history"))
}
