//! Fan-out listeners.

use crate::error::Error;
use crate::types::{Message, UsageEvent};

use super::listener::{ChatListener, ResponseStreamer};

/// Forwards every call to each child streamer, in order.
pub struct CompositeResponseStreamer {
    streamers: Vec<Box<dyn ResponseStreamer>>,
}

impl CompositeResponseStreamer {
    /// Create a composite over `streamers`.
    pub fn new(streamers: Vec<Box<dyn ResponseStreamer>>) -> Self {
        Self { streamers }
    }
}

impl ResponseStreamer for CompositeResponseStreamer {
    fn on_open(&mut self) {
        for streamer in &mut self.streamers {
            streamer.on_open();
        }
    }

    fn on_next_token(&mut self, token: &str) {
        for streamer in &mut self.streamers {
            streamer.on_next_token(token);
        }
    }

    fn on_thinking_token(&mut self, token: &str) {
        for streamer in &mut self.streamers {
            streamer.on_thinking_token(token);
        }
    }

    fn on_tool_call(&mut self, name: &str, arguments: &str) {
        for streamer in &mut self.streamers {
            streamer.on_tool_call(name, arguments);
        }
    }

    fn on_interrupted(&mut self) {
        for streamer in &mut self.streamers {
            streamer.on_interrupted();
        }
    }

    fn on_close(&mut self) {
        for streamer in &mut self.streamers {
            streamer.on_close();
        }
    }
}

/// Forwards every call to each child listener in registration order.
#[derive(Default)]
pub struct CompositeChatListener {
    listeners: Vec<Box<dyn ChatListener>>,
}

impl CompositeChatListener {
    /// Create a composite over `listeners`.
    pub fn new(listeners: Vec<Box<dyn ChatListener>>) -> Self {
        Self { listeners }
    }

    /// Append a listener.
    pub fn push(&mut self, listener: Box<dyn ChatListener>) {
        self.listeners.push(listener);
    }

    /// Number of child listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if there are no child listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl ChatListener for CompositeChatListener {
    fn on_chat_start(&mut self) {
        for listener in &mut self.listeners {
            listener.on_chat_start();
        }
    }

    fn on_chat_clear(&mut self) {
        for listener in &mut self.listeners {
            listener.on_chat_clear();
        }
    }

    fn on_chat_rerun(&mut self, success: bool) {
        for listener in &mut self.listeners {
            listener.on_chat_rerun(success);
        }
    }

    fn on_error(&mut self, error: &Error) {
        for listener in &mut self.listeners {
            listener.on_error(error);
        }
    }

    fn on_chat_message(&mut self, message: &Message) {
        for listener in &mut self.listeners {
            listener.on_chat_message(message);
        }
    }

    fn on_chat_response(
        &mut self,
        messages: &[Message],
        response: &Message,
        usage: Option<&UsageEvent>,
    ) {
        for listener in &mut self.listeners {
            listener.on_chat_response(messages, response, usage);
        }
    }

    fn response_streamer(&mut self) -> Box<dyn ResponseStreamer> {
        Box::new(CompositeResponseStreamer::new(
            self.listeners
                .iter_mut()
                .map(|listener| listener.response_streamer())
                .collect(),
        ))
    }
}
