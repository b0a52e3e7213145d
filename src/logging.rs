//! Log setup and the session listener that writes to the log.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use time::OffsetDateTime;
use time::format_description;
use tracing_subscriber::EnvFilter;

use crate::chat::ChatListener;
use crate::error::{Error, Result};
use crate::types::{Message, UsageEvent};

/// Expand strftime fields such as `%Y-%m-%d_%H-%M-%S` in a log path.
///
/// An unknown or dangling field is a configuration error.
///
/// ```
/// use colloquy::logging::expand_log_path;
/// use time::macros::datetime;
///
/// let path = expand_log_path("chat-%Y%m%d.log", datetime!(2024-03-09 08:05:01 UTC)).unwrap();
/// assert_eq!(path, "chat-20240309.log");
/// ```
pub fn expand_log_path(pattern: &str, now: OffsetDateTime) -> Result<String> {
    let items = format_description::parse_strftime_borrowed(pattern)
        .map_err(|err| Error::config(format!("invalid log file pattern {pattern:?}: {err}")))?;
    now.format(&items)
        .map_err(|err| Error::config(format!("cannot expand log file pattern {pattern:?}: {err}")))
}

/// Install a tracing subscriber that appends to `log_file`.
///
/// Without a log file nothing is installed and the session stays quiet on the
/// terminal.  `level` is an env-filter directive such as `info` or
/// `colloquy=debug`.
pub fn init_logging(log_file: Option<&str>, level: &str) -> Result<Option<PathBuf>> {
    let Some(pattern) = log_file else {
        return Ok(None);
    };
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let path = PathBuf::from(expand_log_path(pattern, now)?);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| Error::io(format!("cannot create {}", parent.display()), err))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| Error::io(format!("cannot open log file {}", path.display()), err))?;
    let filter = EnvFilter::try_new(level)
        .map_err(|err| Error::config(format!("invalid log level {level:?}: {err}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| Error::config(format!("failed to initialize logging: {err}")))?;
    Ok(Some(path))
}

/// Writes the session's lifecycle to the log.
#[derive(Debug, Default)]
pub struct LoggingChatListener;

impl LoggingChatListener {
    /// Create a listener that logs through the global tracing subscriber.
    pub fn new() -> Self {
        Self
    }
}

impl ChatListener for LoggingChatListener {
    fn on_chat_start(&mut self) {
        tracing::info!("chat started");
    }

    fn on_chat_clear(&mut self) {
        tracing::info!("cleared the conversation");
    }

    fn on_chat_rerun(&mut self, success: bool) {
        if success {
            tracing::info!("re-generating the last message");
        } else {
            tracing::info!("nothing to re-run");
        }
    }

    fn on_error(&mut self, error: &Error) {
        tracing::error!(
            error = %error,
            status = ?error.status_code(),
            request_id = ?error.request_id(),
            retryable = error.is_retryable(),
            "chat error"
        );
    }

    fn on_chat_message(&mut self, message: &Message) {
        tracing::info!(role = %message.role, content = %message.content, "message");
    }

    fn on_chat_response(
        &mut self,
        messages: &[Message],
        response: &Message,
        usage: Option<&UsageEvent>,
    ) {
        match usage {
            Some(usage) => tracing::info!(
                context = messages.len(),
                chars = response.content.len(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = usage.cost,
                "response"
            ),
            None => tracing::info!(
                context = messages.len(),
                chars = response.content.len(),
                "response"
            ),
        }
    }
}
