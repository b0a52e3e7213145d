//! Non-interactive modes: one prompt in, one response out, or one shell
//! command out that the user edits and runs.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;

use crate::assistant::ChatAssistant;
use crate::chat::Interrupt;
use crate::error::{Error, Result};
use crate::types::{CompletionEvent, Message, ModelOverrides};

/// Answer `prompt` as `assistant` and write the response text to `out`.
///
/// The persona's messages come first, then the prompt as a user message.
/// Raising `interrupt` stops the response and keeps what was already written.
/// Returns the response text.
pub async fn simple_response<A: ChatAssistant + ?Sized>(
    assistant: &A,
    prompt: &str,
    stream: bool,
    interrupt: &Interrupt,
    out: &mut (dyn Write + Send),
) -> Result<String> {
    let mut messages = assistant.init_messages();
    messages.push(Message::user(prompt));
    tracing::info!(prompt = %prompt, "one-shot prompt");

    let mut text = String::new();
    let overrides = ModelOverrides::default();
    let request = assistant.complete_chat(&messages, &overrides, stream);
    let mut events = tokio::select! {
        biased;
        _ = interrupt.wait() => return Ok(text),
        events = request => events?,
    };
    loop {
        let event = tokio::select! {
            biased;
            _ = interrupt.wait() => break,
            event = events.next() => event,
        };
        match event {
            Some(Ok(CompletionEvent::MessageDelta(delta))) => {
                out.write_all(delta.as_bytes())
                    .and_then(|_| out.flush())
                    .map_err(|err| Error::io("cannot write response", err))?;
                text.push_str(&delta);
            }
            Some(Ok(CompletionEvent::Usage(usage))) => {
                tracing::info!(tokens = usage.total_tokens, cost = usage.cost, "one-shot usage");
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err),
            None => break,
        }
    }
    if !text.is_empty() && !text.ends_with('\n') {
        out.write_all(b"\n")
            .map_err(|err| Error::io("cannot write response", err))?;
    }
    tracing::info!(response = %text, "one-shot response");
    Ok(text)
}

/// Preamble written above the suggested command in the edit buffer.
pub const EXECUTE_HEADER: &str = "# Edit the command to execute below. Save and exit to execute it.\n\
                                  # Delete the contents to cancel.\n";

/// Ask `assistant` for a shell command answering `prompt`, let the user edit
/// it with `editor`, then run it with `shell`.
///
/// `editor` is a shell fragment, so values such as `code -w` work; the buffer
/// path is appended as its last argument.  Returns `None` when the user
/// empties the buffer, otherwise the exit status of the command.
pub async fn execute<A: ChatAssistant + ?Sized>(
    assistant: &A,
    prompt: &str,
    interrupt: &Interrupt,
    editor: &str,
    shell: &str,
) -> Result<Option<ExitStatus>> {
    let mut sink = std::io::sink();
    let suggestion = simple_response(assistant, prompt, false, interrupt, &mut sink).await?;
    let path = edit_buffer_path();
    let edited = edit_command(&path, &suggestion, editor, shell).await;
    if let Err(err) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), error = %err, "cannot remove edit buffer");
    }
    let Some(command) = edited? else {
        tracing::info!("execute cancelled");
        return Ok(None);
    };
    tracing::info!(command = %command, "executing command");
    let status = tokio::process::Command::new(shell)
        .arg("-c")
        .arg(&command)
        .status()
        .await
        .map_err(|err| Error::io(format!("cannot run {shell}"), err))?;
    tracing::info!(status = %status, "command finished");
    Ok(Some(status))
}

/// The command left in an edit buffer: comment lines are dropped and `None`
/// means the user cancelled.
pub fn command_from_edit(buffer: &str) -> Option<String> {
    let command = buffer
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");
    let command = command.trim();
    if command.is_empty() {
        None
    } else {
        Some(command.to_string())
    }
}

async fn edit_command(
    path: &Path,
    suggestion: &str,
    editor: &str,
    shell: &str,
) -> Result<Option<String>> {
    let buffer = format!("{EXECUTE_HEADER}{}\n", suggestion.trim_end());
    tokio::fs::write(path, buffer)
        .await
        .map_err(|err| Error::io("cannot write edit buffer", err))?;
    let status = tokio::process::Command::new(shell)
        .arg("-c")
        .arg(format!("{editor} \"$0\""))
        .arg(path)
        .status()
        .await
        .map_err(|err| Error::io(format!("cannot start editor {editor}"), err))?;
    if !status.success() {
        return Err(Error::config(format!("editor {editor} exited with {status}")));
    }
    let edited = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::io("cannot read edit buffer", err))?;
    Ok(command_from_edit(&edited))
}

fn edit_buffer_path() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("colloquy-{}-{nanos}-{seq}.sh", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CompletionStream;
    use crate::types::OverrideKey;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<Vec<CompletionEvent>>,
        hang: bool,
        seen: Mutex<Vec<Message>>,
    }

    impl Canned {
        fn new(reply: Result<Vec<CompletionEvent>>) -> Self {
            Self {
                reply,
                hang: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatAssistant for Canned {
        fn init_messages(&self) -> Vec<Message> {
            vec![Message::system("be brief")]
        }

        fn supported_overrides(&self) -> &[OverrideKey] {
            OverrideKey::ALL
        }

        async fn complete_chat(
            &self,
            messages: &[Message],
            _overrides: &ModelOverrides,
            _stream: bool,
        ) -> Result<CompletionStream> {
            *self.seen.lock().unwrap() = messages.to_vec();
            let events = self.reply.clone()?;
            let head = stream::iter(events.into_iter().map(Ok));
            if self.hang {
                Ok(Box::pin(head.chain(stream::pending())))
            } else {
                Ok(Box::pin(head))
            }
        }
    }

    #[tokio::test]
    async fn writes_response_after_persona() {
        let assistant = Canned::new(Ok(vec![
            CompletionEvent::ThinkingDelta("hmm".into()),
            CompletionEvent::MessageDelta("ls ".into()),
            CompletionEvent::MessageDelta("-la".into()),
        ]));
        let mut out = Vec::new();
        let text = simple_response(&assistant, "list files", true, &Interrupt::new(), &mut out)
            .await
            .unwrap();
        assert_eq!(text, "ls -la");
        assert_eq!(String::from_utf8(out).unwrap(), "ls -la\n");
        assert_eq!(
            *assistant.seen.lock().unwrap(),
            vec![Message::system("be brief"), Message::user("list files")]
        );
    }

    #[tokio::test]
    async fn error_propagates() {
        let assistant = Canned::new(Err(Error::authentication("bad key")));
        let mut out = Vec::new();
        let err = simple_response(&assistant, "hi", false, &Interrupt::new(), &mut out)
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn interrupt_keeps_partial_output() {
        let mut assistant = Canned::new(Ok(vec![CompletionEvent::MessageDelta("part".into())]));
        assistant.hang = true;
        let interrupt = Interrupt::new();
        let trigger = {
            let interrupt = interrupt.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                interrupt.trigger();
            })
        };
        let mut out = Vec::new();
        let text = simple_response(&assistant, "go", true, &interrupt, &mut out)
            .await
            .unwrap();
        trigger.await.unwrap();
        assert_eq!(text, "part");
        assert_eq!(String::from_utf8(out).unwrap(), "part\n");
    }

    #[test]
    fn comments_are_dropped_from_edit() {
        let buffer = format!("{EXECUTE_HEADER}ls -la\n# trailing note\n");
        assert_eq!(command_from_edit(&buffer), Some("ls -la".to_string()));
        assert_eq!(command_from_edit(EXECUTE_HEADER), None);
        assert_eq!(command_from_edit("  \n\n"), None);
    }

    #[tokio::test]
    async fn emptied_buffer_cancels() {
        let assistant = Canned::new(Ok(vec![CompletionEvent::MessageDelta("exit 3".into())]));
        let status = execute(&assistant, "fail", &Interrupt::new(), ": >", "sh")
            .await
            .unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn kept_command_runs_in_shell() {
        let assistant = Canned::new(Ok(vec![CompletionEvent::MessageDelta("exit 3".into())]));
        let status = execute(&assistant, "fail", &Interrupt::new(), "true", "sh")
            .await
            .unwrap();
        assert_eq!(status.and_then(|s| s.code()), Some(3));
        assert_eq!(
            *assistant.seen.lock().unwrap(),
            vec![Message::system("be brief"), Message::user("fail")]
        );
    }

    #[tokio::test]
    async fn failing_editor_is_an_error() {
        let assistant = Canned::new(Ok(vec![CompletionEvent::MessageDelta("ls".into())]));
        let err = execute(&assistant, "list", &Interrupt::new(), "false", "sh")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("false"));
    }
}
