//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! Every provider speaks SSE but each puts a different JSON payload in the
//! `data:` field.  This module turns a raw HTTP byte stream into [`SseFrame`]s
//! and leaves payload decoding to the provider.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::observability::STREAM_BYTES;

/// A single decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The concatenated `data:` lines.
    pub data: String,
}

impl SseFrame {
    /// Returns true for the OpenAI-style `[DONE]` terminator.
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Frames are split on blank lines.  Bytes are buffered until a frame is
/// complete, so chunk boundaries (including ones that split a multi-byte
/// character) never corrupt a frame.  Frames that carry neither an event
/// name nor data, such as keep-alive comments, are skipped.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<SseFrame>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer),
        move |(mut stream, mut buffer)| async move {
            loop {
                // First check if we have a complete frame in the buffer
                while let Some((raw, rest)) = split_frame(&buffer) {
                    buffer = rest;
                    match decode_frame(&raw) {
                        Ok(Some(frame)) => return Some((Ok(frame), (stream, buffer))),
                        Ok(None) => continue,
                        Err(err) => return Some((Err(err), (stream, buffer))),
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer)));
                    }
                    None => {
                        // End of stream; a trailing frame may lack its blank line.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let raw = std::mem::take(&mut buffer);
                        return match decode_frame(&raw) {
                            Ok(Some(frame)) => Some((Ok(frame), (stream, buffer))),
                            Ok(None) => None,
                            Err(err) => Some((Err(err), (stream, buffer))),
                        };
                    }
                }
            }
        },
    )
}

/// Split the first complete frame off the front of `buffer`.
///
/// Accepts both `\n\n` and `\r\n\r\n` as frame delimiters.
fn split_frame(buffer: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let lf = find(buffer, b"\n\n").map(|idx| (idx, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|idx| (idx, 4));
    let (idx, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((buffer[..idx].to_vec(), buffer[idx + len..].to_vec()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode the lines of one frame.
fn decode_frame(raw: &[u8]) -> Result<Option<SseFrame>> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        Error::encoding(format!("Invalid UTF-8 in stream: {e}"), Some(Box::new(e)))
    })?;

    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            // id and retry carry nothing the providers need
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return Ok(None);
    }
    Ok(Some(SseFrame {
        event,
        data: data.join("\n"),
    }))
}
