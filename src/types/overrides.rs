use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Raw `--name value` pairs as typed by the user, before validation.
pub type RawOverrides = BTreeMap<String, String>;

/// A model parameter that may be overridden for a single turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverrideKey {
    /// The model identifier.
    Model,
    /// Sampling temperature.
    Temperature,
    /// Nucleus sampling.
    TopP,
    /// Extended-thinking token budget.
    ThinkingBudget,
}

impl OverrideKey {
    /// Every recognized key.
    pub const ALL: &'static [OverrideKey] = &[
        OverrideKey::Model,
        OverrideKey::Temperature,
        OverrideKey::TopP,
        OverrideKey::ThinkingBudget,
    ];

    /// The name used on the command line and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideKey::Model => "model",
            OverrideKey::Temperature => "temperature",
            OverrideKey::TopP => "top_p",
            OverrideKey::ThinkingBudget => "thinking_budget",
        }
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "model" => Ok(OverrideKey::Model),
            "temperature" => Ok(OverrideKey::Temperature),
            "top_p" => Ok(OverrideKey::TopP),
            "thinking_budget" => Ok(OverrideKey::ThinkingBudget),
            _ => Err(Error::invalid_argument(
                format!("{s} is not a recognized argument"),
                Some(s.to_string()),
            )),
        }
    }
}

/// Validated per-turn parameter overrides.
///
/// Every field left as `None` falls through to the assistant's configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOverrides {
    /// Model identifier override.
    pub model: Option<String>,
    /// Temperature override.
    pub temperature: Option<f64>,
    /// Top-p override.
    pub top_p: Option<f64>,
    /// Thinking budget override.
    pub thinking_budget: Option<u32>,
}

impl ModelOverrides {
    /// Validate raw overrides against the set of keys an assistant supports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the first key that is not in
    /// `supported`, or the first value that does not parse.
    pub fn from_raw(raw: &RawOverrides, supported: &[OverrideKey]) -> Result<Self> {
        let mut overrides = ModelOverrides::default();
        for (name, value) in raw {
            let key = name
                .parse::<OverrideKey>()
                .ok()
                .filter(|key| supported.contains(key))
                .ok_or_else(|| {
                    let allowed: Vec<&str> = supported.iter().map(OverrideKey::as_str).collect();
                    Error::invalid_argument(
                        format!("{name}. Allowed arguments: {}", allowed.join(", ")),
                        Some(name.clone()),
                    )
                })?;
            overrides.set(key, value)?;
        }
        Ok(overrides)
    }

    /// Parse `value` and store it under `key`.
    pub fn set(&mut self, key: OverrideKey, value: &str) -> Result<()> {
        match key {
            OverrideKey::Model => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(Error::invalid_argument(
                        "model requires a model name",
                        Some(key.to_string()),
                    ));
                }
                self.model = Some(value.to_string());
            }
            OverrideKey::Temperature => {
                self.temperature = Some(parse_f64_in_range(key, value, 0.0, 2.0)?);
            }
            OverrideKey::TopP => {
                self.top_p = Some(parse_f64_in_range(key, value, 0.0, 1.0)?);
            }
            OverrideKey::ThinkingBudget => {
                let budget = value.parse::<u32>().map_err(|_| {
                    Error::invalid_argument(
                        format!("{key} expects a positive integer"),
                        Some(key.to_string()),
                    )
                })?;
                self.thinking_budget = Some(budget);
            }
        }
        Ok(())
    }

    /// Returns true if nothing is overridden.
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.thinking_budget.is_none()
    }
}

impl fmt::Display for ModelOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(model) = &self.model {
            parts.push(format!("model={model}"));
        }
        if let Some(temperature) = self.temperature {
            parts.push(format!("temperature={temperature}"));
        }
        if let Some(top_p) = self.top_p {
            parts.push(format!("top_p={top_p}"));
        }
        if let Some(budget) = self.thinking_budget {
            parts.push(format!("thinking_budget={budget}"));
        }
        f.write_str(&parts.join(", "))
    }
}

fn parse_f64_in_range(key: OverrideKey, value: &str, min: f64, max: f64) -> Result<f64> {
    let invalid = || {
        Error::invalid_argument(
            format!("{key} expects a value between {min} and {max}"),
            Some(key.to_string()),
        )
    };
    let parsed: f64 = value.trim().parse().map_err(|_| invalid())?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawOverrides {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_raw_is_empty_overrides() {
        let overrides = ModelOverrides::from_raw(&RawOverrides::new(), OverrideKey::ALL).unwrap();
        assert!(overrides.is_empty());
    }

    #[test]
    fn parses_known_keys() {
        let overrides = ModelOverrides::from_raw(
            &raw(&[("model", "gpt-4"), ("temperature", "0.5"), ("top_p", "0.9")]),
            OverrideKey::ALL,
        )
        .unwrap();
        assert_eq!(overrides.model.as_deref(), Some("gpt-4"));
        assert_eq!(overrides.temperature, Some(0.5));
        assert_eq!(overrides.top_p, Some(0.9));
        assert_eq!(overrides.thinking_budget, None);
        assert_eq!(
            overrides.to_string(),
            "model=gpt-4, temperature=0.5, top_p=0.9"
        );
    }

    #[test]
    fn rejects_unknown_key() {
        let err = ModelOverrides::from_raw(&raw(&[("bogus", "1")]), OverrideKey::ALL).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn rejects_unsupported_key() {
        let supported = [OverrideKey::Model, OverrideKey::Temperature, OverrideKey::TopP];
        let err =
            ModelOverrides::from_raw(&raw(&[("thinking_budget", "1024")]), &supported).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("Allowed arguments: model, temperature, top_p"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(ModelOverrides::from_raw(&raw(&[("top_p", "1.5")]), OverrideKey::ALL).is_err());
        assert!(ModelOverrides::from_raw(&raw(&[("temperature", "hot")]), OverrideKey::ALL).is_err());
        assert!(
            ModelOverrides::from_raw(&raw(&[("thinking_budget", "-1")]), OverrideKey::ALL).is_err()
        );
    }
}
