//! Terminal output for the interactive session.
//!
//! [`TerminalListener`] prints session notices and errors; the
//! [`TerminalStreamer`] it hands out prints one response as it streams.
//! ANSI styling is optional so output can be piped.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::chat::{ChatListener, ResponseStreamer};
use crate::error::Error;

/// ANSI escape code for bold text (used for session notices).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for thinking blocks).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for thinking blocks).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for tool names).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for tool arguments).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for response text).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

const WELCOME: &str = "\
Hi! I'm here to help. Type `:q` or Ctrl-D to exit, `:c` or Ctrl-C to clear
the conversation, `:r` or Ctrl-R to re-generate the last response, `:h` for help.
To enter multi-line mode, enter a backslash `\\` followed by a new line.
Finish a multi-line message with Ctrl-D.  Ctrl-C stops a response.
";

/// Shared sink the listener and its streamers write to.
pub type Output = Arc<Mutex<dyn Write + Send>>;

/// An [`Output`] over the process's stdout.
pub fn stdout() -> Output {
    Arc::new(Mutex::new(io::stdout()))
}

pub(crate) fn write_out(out: &Output, text: &str) {
    let Ok(mut out) = out.lock() else {
        return;
    };
    _ = out.write_all(text.as_bytes());
    _ = out.flush();
}

///////////////////////////////////////////// Streamer ////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    Text,
    Thinking,
    Tool,
}

/// Prints one streamed response.
pub struct TerminalStreamer {
    out: Output,
    use_color: bool,
    style: Style,
    wrote: bool,
    line_start: bool,
}

impl TerminalStreamer {
    /// Create a streamer writing to `out`.
    pub fn new(out: Output, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            style: Style::Plain,
            wrote: false,
            line_start: true,
        }
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        write_out(&self.out, text);
        self.wrote = true;
        self.line_start = text.ends_with('\n');
    }

    fn escape(&mut self, code: &str) {
        write_out(&self.out, code);
    }

    /// Switch styles, emitting whatever separates the old block from the new.
    fn enter(&mut self, style: Style) {
        if self.style == style {
            return;
        }
        let previous = self.style;
        self.style = style;
        if self.use_color && previous != Style::Plain {
            self.escape(ANSI_RESET);
        }
        if previous == Style::Thinking && !self.line_start {
            self.write("\n\n");
        }
        match (style, self.use_color) {
            (Style::Text, true) => self.escape(ANSI_GREEN),
            (Style::Thinking, true) => {
                self.escape(ANSI_DIM);
                self.escape(ANSI_ITALIC);
            }
            (Style::Thinking, false) => self.write("[thinking] "),
            (Style::Tool, true) => self.escape(ANSI_YELLOW),
            _ => {}
        }
    }
}

impl ResponseStreamer for TerminalStreamer {
    fn on_next_token(&mut self, token: &str) {
        self.enter(Style::Text);
        self.write(token);
    }

    fn on_thinking_token(&mut self, token: &str) {
        self.enter(Style::Thinking);
        self.write(token);
    }

    fn on_tool_call(&mut self, name: &str, arguments: &str) {
        if !name.is_empty() {
            self.enter(Style::Plain);
            let banner = if self.use_color {
                format!("\n{ANSI_CYAN}[tool: {name}]{ANSI_RESET}\n")
            } else {
                format!("\n[tool: {name}]\n")
            };
            self.write(&banner);
        }
        self.enter(Style::Tool);
        self.write(arguments);
    }

    fn on_interrupted(&mut self) {
        self.enter(Style::Plain);
        self.write("\n[interrupted]\n");
    }

    fn on_close(&mut self) {
        self.enter(Style::Plain);
        if self.wrote && !self.line_start {
            self.write("\n");
        }
    }
}

///////////////////////////////////////////// Listener ////////////////////////////////////////////

/// Session notices and errors for a human at a terminal.
pub struct TerminalListener {
    out: Output,
    use_color: bool,
}

impl TerminalListener {
    /// Create a listener printing to stdout.
    pub fn new(use_color: bool) -> Self {
        Self::with_output(stdout(), use_color)
    }

    /// Create a listener printing to `out`.
    pub fn with_output(out: Output, use_color: bool) -> Self {
        Self { out, use_color }
    }

    fn notice(&self, color: &str, text: &str) {
        let line = if self.use_color {
            format!("{color}{text}{ANSI_RESET}\n")
        } else {
            format!("{text}\n")
        };
        write_out(&self.out, &line);
    }
}

/// A one-line explanation of `error` that says what the user can do next.
pub fn describe_error(error: &Error) -> String {
    if error.is_rejected_request() {
        format!("Request Error. The last prompt was not saved: {error}")
    } else if error.is_authentication() {
        format!("Authentication Error. Check the API key in your configuration: {error}")
    } else {
        format!("API Error. Type `:r` to try again: {error}")
    }
}

impl ChatListener for TerminalListener {
    fn on_chat_start(&mut self) {
        write_out(&self.out, WELCOME);
    }

    fn on_chat_clear(&mut self) {
        self.notice(ANSI_BOLD, "Cleared the conversation.");
    }

    fn on_chat_rerun(&mut self, success: bool) {
        if success {
            self.notice(ANSI_BOLD, "Re-running the last message.");
        } else {
            self.notice(ANSI_BOLD, "Nothing to re-run.");
        }
    }

    fn on_error(&mut self, error: &Error) {
        self.notice(ANSI_RED, &describe_error(error));
    }

    fn response_streamer(&mut self) -> Box<dyn ResponseStreamer> {
        Box::new(TerminalStreamer::new(self.out.clone(), self.use_color))
    }
}
