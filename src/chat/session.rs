//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! transcript, interprets session commands, and drives each exchange with the
//! assistant while relaying streamed tokens to a [`ChatListener`].

use std::time::Instant;

use futures::StreamExt;

use crate::assistant::{Assistant, ChatAssistant};
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_CLEARS, SESSION_ERRORS, SESSION_INTERRUPTS, SESSION_RERUNS, SESSION_ROLLBACKS,
    SESSION_TURN_COST, SESSION_TURN_DURATION, SESSION_TURNS,
};
use crate::types::{CompletionEvent, Message, ModelOverrides, RawOverrides, UsageEvent};

use super::commands::{SessionCommand, help_text, parse_command};
use super::interrupt::Interrupt;
use super::listener::{ChatListener, StreamGuard, UserInputProvider};

/// How a single exchange with the assistant ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnOutcome {
    /// A response (possibly partial) was appended to the transcript.
    Saved,
    /// The request failed in a way a rerun may fix; the user message stays.
    Failed,
    /// The request was refused outright; the user message must be rolled back.
    Rejected,
}

/// What came back from one pull of the completion stream.
#[derive(Debug, Default)]
struct Response {
    text: String,
    usage: Option<UsageEvent>,
    interrupted: bool,
}

/// A chat session that manages conversation state and assistant interactions.
///
/// The session is driven one input at a time through
/// [`process_input`](ChatSession::process_input), or by
/// [`run`](ChatSession::run) with a [`UserInputProvider`].
pub struct ChatSession<A: ChatAssistant = Assistant> {
    assistant: A,
    listener: Box<dyn ChatListener>,
    messages: Vec<Message>,
    user_prompts: Vec<(Message, ModelOverrides)>,
    stream: bool,
    interrupt: Interrupt,
}

impl<A: ChatAssistant> ChatSession<A> {
    /// Creates a new streaming session seeded with the assistant's persona.
    pub fn new(assistant: A, listener: Box<dyn ChatListener>) -> Self {
        let messages = assistant.init_messages();
        Self {
            assistant,
            listener,
            messages,
            user_prompts: Vec::new(),
            stream: true,
            interrupt: Interrupt::new(),
        }
    }

    /// Request streamed (`true`) or whole (`false`) responses.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Use `interrupt` to cancel in-flight responses.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// A handle that cancels the response currently streaming.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// The assistant answering in this session.
    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    /// The current transcript.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The accepted user messages and their overrides, oldest first.
    pub fn user_prompts(&self) -> &[(Message, ModelOverrides)] {
        &self.user_prompts
    }

    /// Run the session until the user quits.
    pub async fn run(&mut self, input: &mut dyn UserInputProvider) {
        self.listener.on_chat_start();
        loop {
            let (line, overrides) = input.get_user_input();
            if !self.process_input(&line, &overrides).await {
                break;
            }
        }
        tracing::info!(messages = self.messages.len(), "chat session ended");
    }

    /// Process one line of input; returns false when the session should stop.
    ///
    /// Overrides are validated before anything else, so a bad override never
    /// reaches the transcript or the assistant.
    pub async fn process_input(&mut self, input: &str, overrides: &RawOverrides) -> bool {
        let overrides =
            match ModelOverrides::from_raw(overrides, self.assistant.supported_overrides()) {
                Ok(overrides) => overrides,
                Err(err) => {
                    self.report(&err);
                    return true;
                }
            };

        match parse_command(input) {
            Some(SessionCommand::Quit) => return false,
            Some(SessionCommand::Clear) => self.clear(),
            Some(SessionCommand::Rerun) => self.rerun().await,
            Some(SessionCommand::Help) => self.help(),
            None => self.turn(input, overrides).await,
        }
        true
    }

    /// Reset the transcript to the persona and forget every prompt.
    pub fn clear(&mut self) {
        SESSION_CLEARS.click();
        self.messages = self.assistant.init_messages();
        self.user_prompts.clear();
        tracing::info!("chat cleared");
        self.listener.on_chat_clear();
    }

    /// Re-execute the last recorded user message with its overrides.
    pub async fn rerun(&mut self) {
        SESSION_RERUNS.click();
        let Some((_, overrides)) = self.user_prompts.last().cloned() else {
            self.listener.on_chat_rerun(false);
            return;
        };

        if self.messages.last().is_some_and(Message::is_assistant) {
            self.messages.pop();
        }
        self.listener.on_chat_rerun(true);
        tracing::info!(%overrides, "rerunning last message");

        if self.respond(&overrides).await == TurnOutcome::Rejected {
            self.rollback();
        }
    }

    fn help(&mut self) {
        let mut stream = StreamGuard::open(self.listener.response_streamer());
        stream.on_next_token(help_text());
    }

    async fn turn(&mut self, input: &str, overrides: ModelOverrides) {
        let user = Message::user(input);
        self.messages.push(user.clone());
        self.listener.on_chat_message(&user);
        self.user_prompts.push((user, overrides.clone()));

        if self.respond(&overrides).await == TurnOutcome::Rejected {
            self.rollback();
        }
    }

    /// Remove the most recent user message and its prompt-history entry.
    fn rollback(&mut self) {
        SESSION_ROLLBACKS.click();
        if self.messages.last().is_some_and(Message::is_user) {
            self.messages.pop();
        }
        self.user_prompts.pop();
        tracing::info!(messages = self.messages.len(), "rolled back user message");
    }

    /// Request a response to the current transcript and commit it.
    async fn respond(&mut self, overrides: &ModelOverrides) -> TurnOutcome {
        SESSION_TURNS.click();
        let start = Instant::now();
        self.interrupt.reset();

        let result = {
            let mut stream = StreamGuard::open(self.listener.response_streamer());
            self.collect_response(&mut stream, overrides).await
        };
        SESSION_TURN_DURATION.add(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                if response.interrupted {
                    SESSION_INTERRUPTS.click();
                    tracing::info!(chars = response.text.len(), "response interrupted");
                }
                if let Some(usage) = &response.usage {
                    SESSION_TURN_COST.add(usage.cost);
                }
                let message = Message::assistant(response.text);
                self.listener.on_chat_message(&message);
                self.listener
                    .on_chat_response(&self.messages, &message, response.usage.as_ref());
                self.messages.push(message);
                TurnOutcome::Saved
            }
            Err(err) => {
                self.report(&err);
                if err.is_rejected_request() {
                    TurnOutcome::Rejected
                } else {
                    TurnOutcome::Failed
                }
            }
        }
    }

    /// Pull the completion stream to its end or until interrupted.
    async fn collect_response(
        &self,
        stream: &mut StreamGuard,
        overrides: &ModelOverrides,
    ) -> Result<Response> {
        let mut response = Response::default();

        let request = self
            .assistant
            .complete_chat(&self.messages, overrides, self.stream);
        let mut events = tokio::select! {
            biased;
            _ = self.interrupt.wait() => {
                response.interrupted = true;
                stream.on_interrupted();
                return Ok(response);
            }
            events = request => events?,
        };

        loop {
            tokio::select! {
                biased;
                _ = self.interrupt.wait() => {
                    response.interrupted = true;
                    stream.on_interrupted();
                    break;
                }
                event = events.next() => match event {
                    Some(Ok(CompletionEvent::MessageDelta(text))) => {
                        stream.on_next_token(&text);
                        response.text.push_str(&text);
                    }
                    Some(Ok(CompletionEvent::ThinkingDelta(text))) => {
                        stream.on_thinking_token(&text);
                    }
                    Some(Ok(CompletionEvent::ToolCall { name, arguments })) => {
                        stream.on_tool_call(&name, &arguments);
                    }
                    Some(Ok(CompletionEvent::Usage(usage))) => {
                        response.usage = Some(usage);
                    }
                    Some(Err(err)) => return Err(err),
                    None => break,
                },
            }
        }
        Ok(response)
    }

    fn report(&mut self, err: &Error) {
        SESSION_ERRORS.click();
        if err.is_rejected_request() {
            tracing::warn!(error = %err, "request rejected");
        } else {
            tracing::error!(error = %err, "completion failed");
        }
        self.listener.on_error(err);
    }
}
