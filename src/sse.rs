//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of a `chat/completions` response into
//! [`StreamEvent`]s.  Events are separated by blank lines; each carries one or
//! more `data:` lines holding a JSON chunk, and the stream ends with
//! `data: [DONE]`.  Comment lines (`: keep-alive`) are skipped.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS};
use crate::types::{ChatCompletionChunk, StreamEvent};
use crate::{Error, Result};

/// The payload that marks the end of a completion stream.
const DONE_MARKER: &str = "[DONE]";

/// Process a stream of bytes from `reqwest` into a stream of events.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });
    decode_sse(stream)
}

/// Decode a byte stream into events.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network reads decode correctly.  Nothing is
/// yielded after [`StreamEvent::Done`].
pub fn decode_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    stream::unfold(
        (byte_stream, SseDecoder::default()),
        move |(mut stream, mut decoder)| async move {
            loop {
                if let Some(event) = decoder.pending.pop_front() {
                    return Some((event, (stream, decoder)));
                }
                if decoder.finished {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        decoder.push(&bytes);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        decoder.finished = true;
                        return Some((Err(e), (stream, decoder)));
                    }
                    None => {
                        decoder.finish();
                    }
                }
            }
        },
    )
}

/// Line-oriented SSE decoder state.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
    pending: VecDeque<Result<StreamEvent>>,
    finished: bool,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.line(&line);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.line(&line);
        }
        self.dispatch();
        self.finished = true;
    }

    fn line(&mut self, line: &[u8]) {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                STREAM_ERRORS.click();
                self.pending.push_back(Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                )));
                return;
            }
        };
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
    }

    fn dispatch(&mut self) {
        let Some(data) = self.data.take() else {
            return;
        };
        let data = data.trim();
        if data == DONE_MARKER {
            self.pending.push_back(Ok(StreamEvent::Done));
            self.finished = true;
            return;
        }
        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => {
                self.pending
                    .extend(StreamEvent::from_chunk(&chunk).into_iter().map(Ok));
            }
            Err(e) => {
                STREAM_ERRORS.click();
                self.pending.push_back(Err(Error::serialization(
                    format!("Malformed stream chunk '{data}': {e}"),
                    Some(Box::new(e)),
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(text).unwrap()
        )
    }

    async fn collect(parts: Vec<Vec<u8>>) -> Vec<Result<StreamEvent>> {
        let stream = stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))));
        decode_sse(stream).collect().await
    }

    #[tokio::test]
    async fn parse_text_and_done() {
        let body = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        let events = collect(vec![body.into_bytes()]).await;
        let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Hel".to_string()),
                StreamEvent::Text("lo".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn skips_comments_and_empty_deltas() {
        let body = format!(
            ": keep-alive\n\ndata: {{\"choices\":[{{\"delta\":{{\"role\":\"assistant\",\"content\":\"\"}}}}]}}\n\n{}data: [DONE]\n\n",
            chunk("x")
        );
        let events = collect(vec![body.into_bytes()]).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(StreamEvent::Text(t)) if t == "x"));
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn handle_split_event_and_split_utf8() {
        let body = format!("{}data: [DONE]\r\n\r\n", chunk("你好"));
        let bytes = body.into_bytes();
        // Split inside the first multi-byte character.
        let split = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let events = collect(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;
        assert!(matches!(&events[0], Ok(StreamEvent::Text(t)) if t == "你好"));
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn reasoning_before_text() {
        let body = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\",\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n";
        let events = collect(vec![body.as_bytes().to_vec()]).await;
        assert!(matches!(&events[0], Ok(StreamEvent::Reasoning(t)) if t == "hmm"));
        assert!(matches!(&events[1], Ok(StreamEvent::Text(t)) if t == "ok"));
    }

    #[tokio::test]
    async fn malformed_chunk_is_an_error() {
        let body = "data: {not json\n\ndata: [DONE]\n\n";
        let events = collect(vec![body.as_bytes().to_vec()]).await;
        assert!(events[0].is_err());
        if let Err(e) = &events[0] {
            assert!(e.to_string().contains("Malformed stream chunk"));
        }
        assert!(matches!(events[1], Ok(StreamEvent::Done)));
    }

    #[test]
    fn nothing_after_done() {
        let body = format!("data: [DONE]\n\n{}", chunk("late"));
        let events = tokio_test::block_on(collect(vec![body.into_bytes()]));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn eof_without_done_ends_stream() {
        let events = collect(vec![chunk("partial").into_bytes()]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(StreamEvent::Text(t)) if t == "partial"));
    }

    #[tokio::test]
    async fn transport_error_is_forwarded() {
        let stream = stream::iter(vec![
            Ok(Bytes::from(chunk("a"))),
            Err(Error::streaming("connection reset", None)),
        ]);
        let events: Vec<_> = decode_sse(stream).collect().await;
        assert!(matches!(&events[0], Ok(StreamEvent::Text(t)) if t == "a"));
        assert!(events[1].as_ref().is_err_and(|e| e.is_streaming()));
        assert_eq!(events.len(), 2);
    }
}
