use serde::{Deserialize, Serialize};

/// Per-token prices for a model, in dollars.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Price of a single prompt (input) token.
    pub prompt: f64,

    /// Price of a single response (output) token.
    pub response: f64,
}

impl Pricing {
    /// Build a price from dollars per million tokens.
    pub const fn per_million(prompt: f64, response: f64) -> Self {
        Self {
            prompt: prompt / 1_000_000.0,
            response: response / 1_000_000.0,
        }
    }

    /// Cost of a completion with the given token counts.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        prompt_tokens as f64 * self.prompt + completion_tokens as f64 * self.response
    }
}

/// Token usage and cost for a single completed turn.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,

    /// Tokens produced by the completion.
    pub completion_tokens: u64,

    /// Total tokens billed.
    pub total_tokens: u64,

    /// Cost of the turn in dollars.
    pub cost: f64,
}

impl UsageEvent {
    /// Create a usage event priced with `pricing`, or free when no price is known.
    pub fn with_pricing(
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        pricing: Option<Pricing>,
    ) -> Self {
        let cost = pricing
            .map(|p| p.cost(prompt_tokens, completion_tokens))
            .unwrap_or(0.0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost,
        }
    }
}

/// One element of a provider's completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// A partial chunk of the assistant's reply.
    MessageDelta(String),

    /// A partial chunk of the model's reasoning trace.
    ThinkingDelta(String),

    /// The model started (or continued) a tool call.
    ToolCall {
        /// Name of the tool, empty when the chunk only carries arguments.
        name: String,
        /// Partial JSON arguments.
        arguments: String,
    },

    /// Token usage for the whole turn.
    Usage(UsageEvent),
}

impl CompletionEvent {
    /// Shorthand for a text delta.
    pub fn text(text: impl Into<String>) -> Self {
        CompletionEvent::MessageDelta(text.into())
    }

    /// Shorthand for a thinking delta.
    pub fn thinking(text: impl Into<String>) -> Self {
        CompletionEvent::ThinkingDelta(text.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_with_pricing() {
        let pricing = Pricing::per_million(3.0, 15.0);
        let usage = UsageEvent::with_pricing(1_000, 2_000, 3_000, Some(pricing));
        assert_eq!(usage.total_tokens, 3_000);
        assert!((usage.cost - 0.033).abs() < 1e-9);
    }

    #[test]
    fn usage_without_pricing_is_free() {
        let usage = UsageEvent::with_pricing(10, 20, 30, None);
        assert_eq!(usage.cost, 0.0);
        assert_eq!(usage.prompt_tokens, 10);
    }
}
