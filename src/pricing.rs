//! Per-token price tables.
//!
//! Lookups match on model-name prefixes.  Each table is ordered so that more
//! specific prefixes come before the families that contain them.

use crate::types::Pricing;

const OPENAI_PRICES: &[(&str, Pricing)] = &[
    ("gpt-4o-mini", Pricing::per_million(0.15, 0.60)),
    ("gpt-4o", Pricing::per_million(2.50, 10.00)),
    ("gpt-4.1-nano", Pricing::per_million(0.10, 0.40)),
    ("gpt-4.1-mini", Pricing::per_million(0.40, 1.60)),
    ("gpt-4.1", Pricing::per_million(2.00, 8.00)),
    ("gpt-4-turbo", Pricing::per_million(10.00, 30.00)),
    ("gpt-4-32k", Pricing::per_million(60.00, 120.00)),
    ("gpt-4", Pricing::per_million(30.00, 60.00)),
    ("gpt-3.5-turbo", Pricing::per_million(0.50, 1.50)),
    ("chatgpt-4o", Pricing::per_million(5.00, 15.00)),
    ("o1-mini", Pricing::per_million(1.10, 4.40)),
    ("o1", Pricing::per_million(15.00, 60.00)),
    ("o3-mini", Pricing::per_million(1.10, 4.40)),
    ("o3", Pricing::per_million(2.00, 8.00)),
    ("o4-mini", Pricing::per_million(1.10, 4.40)),
];

const XAI_PRICES: &[(&str, Pricing)] = &[
    ("grok-beta", Pricing::per_million(5.00, 15.00)),
    ("grok-2", Pricing::per_million(2.00, 10.00)),
    ("grok-3-mini", Pricing::per_million(0.30, 0.50)),
    ("grok-3", Pricing::per_million(3.00, 15.00)),
    ("grok-4", Pricing::per_million(3.00, 15.00)),
];

const CLAUDE_INSTANT: Pricing = Pricing::per_million(1.63, 5.51);
const CLAUDE_2: Pricing = Pricing::per_million(11.02, 32.68);
const CLAUDE_OPUS: Pricing = Pricing::per_million(15.00, 75.00);
const CLAUDE_SONNET: Pricing = Pricing::per_million(3.00, 15.00);
const CLAUDE_3_HAIKU: Pricing = Pricing::per_million(0.25, 1.25);
const CLAUDE_3_5_HAIKU: Pricing = Pricing::per_million(0.80, 4.00);

fn lookup(table: &[(&str, Pricing)], model: &str) -> Option<Pricing> {
    table
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, pricing)| *pricing)
}

/// Prices for OpenAI chat models.
pub fn openai_pricing(model: &str) -> Option<Pricing> {
    lookup(OPENAI_PRICES, model)
}

/// Prices for xAI Grok models.
pub fn xai_pricing(model: &str) -> Option<Pricing> {
    lookup(XAI_PRICES, model)
}

/// Prices for Anthropic Claude models.
///
/// Claude model names put the family (`opus`, `sonnet`, `haiku`) in different
/// positions across generations, so these are matched by substring.
pub fn claude_pricing(model: &str) -> Option<Pricing> {
    if !model.starts_with("claude") {
        return None;
    }
    if model.contains("instant") {
        Some(CLAUDE_INSTANT)
    } else if model.contains("claude-2") {
        Some(CLAUDE_2)
    } else if model.contains("opus") {
        Some(CLAUDE_OPUS)
    } else if model.contains("sonnet") {
        Some(CLAUDE_SONNET)
    } else if model.contains("3-5-haiku") {
        Some(CLAUDE_3_5_HAIKU)
    } else if model.contains("haiku") {
        Some(CLAUDE_3_HAIKU)
    } else {
        None
    }
}

/// Prices for any model the built-in providers know about.
pub fn pricing_for(model: &str) -> Option<Pricing> {
    openai_pricing(model)
        .or_else(|| claude_pricing(model))
        .or_else(|| xai_pricing(model))
}
