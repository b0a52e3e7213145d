//! Observer traits for the chat session.
//!
//! A [`ChatListener`] hears about the session's lifecycle; a
//! [`ResponseStreamer`] hears about one response while it streams.  Every
//! method has a no-op default, so implementations override only what they
//! care about.

use std::ops::{Deref, DerefMut};

use crate::error::Error;
use crate::types::{Message, RawOverrides, UsageEvent};

/// Receives one response as it streams.
pub trait ResponseStreamer: Send {
    /// Called before the first token.
    fn on_open(&mut self) {}

    /// A chunk of response text.
    fn on_next_token(&mut self, token: &str) {
        _ = token;
    }

    /// A chunk of the model's reasoning trace.
    fn on_thinking_token(&mut self, token: &str) {
        _ = token;
    }

    /// The model is calling a tool.  `name` is empty for argument-only chunks.
    fn on_tool_call(&mut self, name: &str, arguments: &str) {
        _ = name;
        _ = arguments;
    }

    /// The user stopped the response early.
    fn on_interrupted(&mut self) {}

    /// Called once when the response ends, however it ends.
    fn on_close(&mut self) {}
}

/// A streamer that ignores everything.
#[derive(Debug, Default)]
pub struct NullResponseStreamer;

impl ResponseStreamer for NullResponseStreamer {}

/// Scoped handle on a streamer: opened on creation, closed on drop.
pub struct StreamGuard {
    streamer: Box<dyn ResponseStreamer>,
}

impl StreamGuard {
    /// Open `streamer` and return a guard that will close it.
    pub fn open(mut streamer: Box<dyn ResponseStreamer>) -> Self {
        streamer.on_open();
        Self { streamer }
    }
}

impl Deref for StreamGuard {
    type Target = dyn ResponseStreamer;

    fn deref(&self) -> &Self::Target {
        self.streamer.as_ref()
    }
}

impl DerefMut for StreamGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.streamer.as_mut()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.streamer.on_close();
    }
}

/// Receives session lifecycle events.
pub trait ChatListener: Send {
    /// The session loop started.
    fn on_chat_start(&mut self) {}

    /// The transcript was reset.
    fn on_chat_clear(&mut self) {}

    /// A rerun was requested; `success` is false when there was nothing to rerun.
    fn on_chat_rerun(&mut self, success: bool) {
        _ = success;
    }

    /// Something went wrong during a turn.
    fn on_error(&mut self, error: &Error) {
        _ = error;
    }

    /// A message was added to the transcript.
    fn on_chat_message(&mut self, message: &Message) {
        _ = message;
    }

    /// A response was committed.  `messages` is the transcript the response answers.
    fn on_chat_response(
        &mut self,
        messages: &[Message],
        response: &Message,
        usage: Option<&UsageEvent>,
    ) {
        _ = messages;
        _ = response;
        _ = usage;
    }

    /// A streamer for the next response.
    fn response_streamer(&mut self) -> Box<dyn ResponseStreamer> {
        Box::new(NullResponseStreamer)
    }
}

/// A listener that ignores everything.
#[derive(Debug, Default)]
pub struct NullChatListener;

impl ChatListener for NullChatListener {}

/// Source of user input for [`crate::chat::ChatSession::run`].
pub trait UserInputProvider {
    /// Block until the user enters a line; returns the message and its overrides.
    fn get_user_input(&mut self) -> (String, RawOverrides);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl ResponseStreamer for Recorder {
        fn on_open(&mut self) {
            self.0.lock().unwrap().push("open".to_string());
        }

        fn on_next_token(&mut self, token: &str) {
            self.0.lock().unwrap().push(token.to_string());
        }

        fn on_close(&mut self) {
            self.0.lock().unwrap().push("close".to_string());
        }
    }

    #[test]
    fn guard_opens_and_closes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut guard = StreamGuard::open(Box::new(Recorder(log.clone())));
            guard.on_next_token("a");
            assert_eq!(*log.lock().unwrap(), vec!["open", "a"]);
        }
        assert_eq!(*log.lock().unwrap(), vec!["open", "a", "close"]);
    }

    #[test]
    fn guard_closes_on_early_return() {
        fn stream_then_bail(log: Arc<Mutex<Vec<String>>>) -> Option<()> {
            let mut guard = StreamGuard::open(Box::new(Recorder(log)));
            guard.on_next_token("partial");
            let bail: Option<()> = None;
            bail?;
            guard.on_next_token("unreachable");
            Some(())
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(stream_then_bail(log.clone()).is_none());
        assert_eq!(*log.lock().unwrap(), vec!["open", "partial", "close"]);
    }
}
