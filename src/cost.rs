//! Running spend for the interactive session.

use crate::chat::ChatListener;
use crate::render::{self, Output};
use crate::types::{Message, UsageEvent};

const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RESET: &str = "\x1b[0m";

/// Prints the price of each response and the total since the last clear.
pub struct PriceChatListener {
    out: Output,
    use_color: bool,
    current_spend: f64,
}

impl PriceChatListener {
    /// Create a listener that prints to stdout.
    pub fn new(use_color: bool) -> Self {
        Self::with_output(render::stdout(), use_color)
    }

    /// Create a listener that prints to `out`.
    pub fn with_output(out: Output, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            current_spend: 0.0,
        }
    }

    /// Dollars spent since the session started or was last cleared.
    pub fn current_spend(&self) -> f64 {
        self.current_spend
    }
}

impl ChatListener for PriceChatListener {
    fn on_chat_clear(&mut self) {
        self.current_spend = 0.0;
    }

    fn on_chat_response(
        &mut self,
        _messages: &[Message],
        _response: &Message,
        usage: Option<&UsageEvent>,
    ) {
        let Some(usage) = usage else {
            return;
        };
        self.current_spend += usage.cost;
        tracing::info!(
            tokens = usage.total_tokens,
            price = usage.cost,
            total = self.current_spend,
            "response price"
        );
        let line = format!(
            "Tokens: {} | Price: ${:.3} | Total: ${:.3}",
            usage.total_tokens, usage.cost, self.current_spend
        );
        let line = if self.use_color {
            format!("{ANSI_DIM}{line}{ANSI_RESET}\n")
        } else {
            format!("{line}\n")
        };
        render::write_out(&self.out, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn usage(total: u64, cost: f64) -> UsageEvent {
        UsageEvent {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
            cost,
        }
    }

    fn respond(listener: &mut PriceChatListener, usage: Option<&UsageEvent>) {
        listener.on_chat_response(&[], &Message::assistant("ok"), usage);
    }

    #[test]
    fn accumulates_and_prints() {
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let mut listener = PriceChatListener::with_output(buf.clone(), false);
        respond(&mut listener, Some(&usage(100, 0.0126)));
        respond(&mut listener, Some(&usage(50, 0.0021)));
        assert!((listener.current_spend() - 0.0147).abs() < 1e-12);
        let printed = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert_eq!(
            printed,
            "Tokens: 100 | Price: $0.013 | Total: $0.013\n\
             Tokens: 50 | Price: $0.002 | Total: $0.015\n"
        );
    }

    #[test]
    fn missing_usage_is_ignored() {
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let mut listener = PriceChatListener::with_output(buf.clone(), false);
        respond(&mut listener, None);
        assert_eq!(listener.current_spend(), 0.0);
        assert!(buf.lock().unwrap().is_empty());
    }

    #[test]
    fn clear_resets_spend() {
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let mut listener = PriceChatListener::with_output(buf, false);
        respond(&mut listener, Some(&usage(10, 1.5)));
        listener.on_chat_clear();
        assert_eq!(listener.current_spend(), 0.0);
        respond(&mut listener, Some(&usage(10, 0.25)));
        assert_eq!(listener.current_spend(), 0.25);
    }
}
