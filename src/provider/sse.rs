//! Server-sent events decoding into raw provider events.

use futures::{Stream, StreamExt};

use super::RawEventStream;
use crate::classify::RawEvent;
use crate::error::ThreadRunError;

/// Outcome of one complete SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Event(RawEvent),
    /// `event: done` or `data: [DONE]`.
    Done,
}

/// Incremental SSE decoder. Feed it bytes as they arrive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseFrame, ThreadRunError>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.trim_end_matches('\r');
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<Result<SseFrame, ThreadRunError>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<Result<SseFrame, ThreadRunError>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<SseFrame, ThreadRunError>> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let name = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data).join("\n");

        if name == "done" || data == "[DONE]" {
            return Some(Ok(SseFrame::Done));
        }
        if name == "error" {
            return Some(Err(ThreadRunError::Stream(stream_error_message(&data))));
        }
        if data.is_empty() {
            return Some(Ok(SseFrame::Event(RawEvent::new(name, serde_json::Value::Null))));
        }
        match serde_json::from_str(&data) {
            Ok(value) => Some(Ok(SseFrame::Event(RawEvent::new(name, value)))),
            Err(e) => Some(Err(ThreadRunError::Stream(format!(
                "malformed data for event '{name}': {e}"
            )))),
        }
    }
}

fn stream_error_message(data: &str) -> String {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .or_else(|| v.get("message"))
                .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
        })
        .unwrap_or_else(|| data.to_string())
}

/// Decode a byte stream into raw events. Ends at the first error or done frame.
pub fn decode_event_stream<S, B, E>(bytes: S) -> RawEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ThreadRunError> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut finished = false;
        futures::pin_mut!(bytes);

        'chunks: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    finished = true;
                    break;
                }
            };
            for frame in decoder.push(chunk.as_ref()) {
                match frame {
                    Ok(SseFrame::Event(event)) => {
                        tracing::trace!(event = %event.event, "sse event");
                        yield Ok(event);
                    }
                    Ok(SseFrame::Done) => {
                        finished = true;
                        break 'chunks;
                    }
                    Err(e) => {
                        yield Err(e);
                        finished = true;
                        break 'chunks;
                    }
                }
            }
        }

        if !finished {
            match decoder.finish() {
                Some(Ok(SseFrame::Event(event))) => yield Ok(event),
                Some(Err(e)) => yield Err(e),
                Some(Ok(SseFrame::Done)) | None => {}
            }
        }
    };
    Box::pin(stream)
}

/// Raw events from a streaming HTTP response.
pub fn response_event_stream(response: reqwest::Response) -> RawEventStream {
    decode_event_stream(response.bytes_stream())
}
