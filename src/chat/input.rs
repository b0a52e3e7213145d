//! Terminal input for the interactive session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rustyline::error::ReadlineError;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyEvent,
    Movement, RepeatCount,
};

use crate::error::{Error, Result};
use crate::types::RawOverrides;

use super::commands::{COMMAND_CLEAR, COMMAND_QUIT, COMMAND_RERUN};
use super::listener::UserInputProvider;

static OVERRIDE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"--(\w+)(?:\s+|=)(\S+)").ok());

const PROMPT: &str = "> ";
const MULTILINE_PROMPT: &str = "multiline> ";
const MULTILINE_MARKER: &str = "\\";

/// Split a line into its message and the `--key value` / `--key=value`
/// overrides it carries.
///
/// When overrides are present the message is everything before the first
/// `--`, trimmed.  Later occurrences of a key win.
///
/// ```
/// use colloquy::chat::parse_overrides;
///
/// let (text, overrides) = parse_overrides("tell me a joke --temperature 0.9");
/// assert_eq!(text, "tell me a joke");
/// assert_eq!(overrides.get("temperature").map(String::as_str), Some("0.9"));
/// ```
pub fn parse_overrides(line: &str) -> (String, RawOverrides) {
    let overrides: RawOverrides = OVERRIDE
        .iter()
        .flat_map(|re| re.captures_iter(line))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect();
    if overrides.is_empty() {
        return (line.to_string(), overrides);
    }
    let text = line.split("--").next().unwrap_or_default().trim();
    (text.to_string(), overrides)
}

/// Ctrl-C: on a non-empty line discard it, on an empty one fall through to
/// the interrupt that becomes `:clear`.
struct DiscardOrClear;

impl DiscardOrClear {
    fn command(line: &str) -> Option<Cmd> {
        if line.is_empty() {
            None
        } else {
            Some(Cmd::Kill(Movement::WholeBuffer))
        }
    }
}

impl ConditionalEventHandler for DiscardOrClear {
    fn handle(&self, _: &Event, _: RepeatCount, _: bool, ctx: &EventContext) -> Option<Cmd> {
        Self::command(ctx.line())
    }
}

/// Ctrl-R: on an empty line accept it and flag a rerun; otherwise keep the
/// default history search.
struct RerunOnEmpty(Arc<AtomicBool>);

impl RerunOnEmpty {
    fn command(&self, line: &str) -> Option<Cmd> {
        if !line.is_empty() {
            return None;
        }
        self.0.store(true, Ordering::Relaxed);
        Some(Cmd::AcceptLine)
    }
}

impl ConditionalEventHandler for RerunOnEmpty {
    fn handle(&self, _: &Event, _: RepeatCount, _: bool, ctx: &EventContext) -> Option<Cmd> {
        self.command(ctx.line())
    }
}

/// What one read at the main prompt amounts to.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// A session command produced by a key binding or end of input.
    Command(&'static str),
    /// Enter multi-line mode.
    Multiline,
    /// A line the user typed.
    Line(String),
}

fn classify(read: std::result::Result<String, ReadlineError>, rerun: bool) -> Step {
    match read {
        Ok(_) if rerun => Step::Command(COMMAND_RERUN[0]),
        Ok(line) if line.trim() == MULTILINE_MARKER => Step::Multiline,
        Ok(line) => Step::Line(line),
        Err(ReadlineError::Interrupted) => Step::Command(COMMAND_CLEAR[0]),
        Err(ReadlineError::Eof) => Step::Command(COMMAND_QUIT[0]),
        Err(err) => {
            tracing::error!(error = %err, "cannot read input");
            Step::Command(COMMAND_QUIT[0])
        }
    }
}

/// Reads user input with rustyline, keeping a persistent history file.
///
/// On an empty prompt Ctrl-C clears the conversation, Ctrl-R re-runs the last
/// message and Ctrl-D quits.
pub struct LineEditorInput {
    editor: DefaultEditor,
    history: Option<PathBuf>,
    rerun: Arc<AtomicBool>,
}

impl LineEditorInput {
    /// Create an editor; `history` is loaded now and saved on drop.
    pub fn new(history: Option<PathBuf>) -> Result<Self> {
        let mut editor = DefaultEditor::new().map_err(|err| {
            Error::io(
                "cannot initialize line editor",
                std::io::Error::other(err.to_string()),
            )
        })?;
        if let Some(path) = &history
            && path.exists()
            && let Err(err) = editor.load_history(path)
        {
            tracing::warn!(path = %path.display(), error = %err, "cannot load input history");
        }
        let rerun = Arc::new(AtomicBool::new(false));
        editor.bind_sequence(
            KeyEvent::ctrl('C'),
            EventHandler::Conditional(Box::new(DiscardOrClear)),
        );
        editor.bind_sequence(
            KeyEvent::ctrl('R'),
            EventHandler::Conditional(Box::new(RerunOnEmpty(rerun.clone()))),
        );
        Ok(Self {
            editor,
            history,
            rerun,
        })
    }

    fn read_multiline(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        loop {
            let read = self.editor.readline(MULTILINE_PROMPT);
            self.rerun.store(false, Ordering::Relaxed);
            match read {
                Ok(line) => lines.push(line),
                Err(ReadlineError::Eof) => return Some(lines.join("\n")),
                Err(ReadlineError::Interrupted) => return None,
                Err(err) => {
                    tracing::error!(error = %err, "cannot read multi-line input");
                    return None;
                }
            }
        }
    }
}

impl UserInputProvider for LineEditorInput {
    fn get_user_input(&mut self) -> (String, RawOverrides) {
        loop {
            let read = self.editor.readline(PROMPT);
            let rerun = self.rerun.swap(false, Ordering::Relaxed);
            let line = match classify(read, rerun) {
                Step::Command(command) => return (command.to_string(), RawOverrides::new()),
                Step::Multiline => match self.read_multiline() {
                    Some(text) => text,
                    None => continue,
                },
                Step::Line(line) => line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            _ = self.editor.add_history_entry(line);
            return parse_overrides(line);
        }
    }
}

impl Drop for LineEditorInput {
    fn drop(&mut self) {
        let Some(path) = &self.history else {
            return;
        };
        if let Some(parent) = path.parent() {
            _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = self.editor.save_history(path) {
            tracing::warn!(path = %path.display(), error = %err, "cannot save input history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_c_on_empty_prompt_clears() {
        assert_eq!(DiscardOrClear::command(""), None);
        assert_eq!(
            classify(Err(ReadlineError::Interrupted), false),
            Step::Command(":clear")
        );
    }

    #[test]
    fn ctrl_c_on_typed_line_discards_it() {
        assert_eq!(
            DiscardOrClear::command("half a thought"),
            Some(Cmd::Kill(Movement::WholeBuffer))
        );
    }

    #[test]
    fn ctrl_r_on_empty_prompt_reruns() {
        let flag = Arc::new(AtomicBool::new(false));
        let handler = RerunOnEmpty(flag.clone());
        assert_eq!(handler.command(""), Some(Cmd::AcceptLine));
        assert!(flag.load(Ordering::Relaxed));
        assert_eq!(classify(Ok(String::new()), true), Step::Command(":rerun"));
    }

    #[test]
    fn ctrl_r_on_typed_line_keeps_search() {
        let flag = Arc::new(AtomicBool::new(false));
        let handler = RerunOnEmpty(flag.clone());
        assert_eq!(handler.command("git"), None);
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn ctrl_d_quits_and_lines_pass_through() {
        assert_eq!(classify(Err(ReadlineError::Eof), false), Step::Command(":quit"));
        assert_eq!(classify(Ok(" \\ ".to_string()), false), Step::Multiline);
        assert_eq!(
            classify(Ok("hello".to_string()), false),
            Step::Line("hello".to_string())
        );
    }

    #[test]
    fn plain_line_has_no_overrides() {
        let (text, overrides) = parse_overrides("  hello world ");
        assert_eq!(text, "  hello world ");
        assert!(overrides.is_empty());
    }

    #[test]
    fn space_and_equals_forms() {
        let (text, overrides) = parse_overrides("hi --model gpt-4 --temperature=0.2");
        assert_eq!(text, "hi");
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides["model"], "gpt-4");
        assert_eq!(overrides["temperature"], "0.2");
    }

    #[test]
    fn later_key_wins() {
        let (_, overrides) = parse_overrides("x --top_p 0.1 --top_p 0.5");
        assert_eq!(overrides["top_p"], "0.5");
    }

    #[test]
    fn unknown_keys_are_kept_for_validation() {
        let (text, overrides) = parse_overrides("Hello --bogus 1");
        assert_eq!(text, "Hello");
        assert_eq!(overrides["bogus"], "1");
    }

    #[test]
    fn trailing_flag_without_value_is_text() {
        let (text, overrides) = parse_overrides("what does --verbose");
        assert_eq!(text, "what does --verbose");
        assert!(overrides.is_empty());
    }

    #[test]
    fn only_overrides_leaves_empty_text() {
        let (text, overrides) = parse_overrides("--model claude-3-opus");
        assert_eq!(text, "");
        assert_eq!(overrides["model"], "claude-3-opus");
    }
}
