//! The per-reply streaming state machine.
//!
//! A [`StreamingRenderer`] owns the [`RenderBuffer`] for one assistant reply.
//! It starts `Idle`, moves to `Streaming` on the first chunk, and ends either
//! `Complete` (everything flushed, full text returned) or `Failed` (stable
//! text flushed, partial text returned with a marker appended).

use std::time::Duration;

use crate::markdown::RenderBuffer;
use crate::render::Renderer;
use crate::{Error, Result};

/// Appended to partial text when a reply is cut short by the user.
pub const INTERRUPTED_MARKER: &str = "[interrupted]";

/// Where a reply is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing received yet.
    Idle,
    /// Chunks are arriving.
    Streaming,
    /// The stream ended normally.
    Complete,
    /// The stream was cut short.
    Failed,
}

impl StreamState {
    /// Returns true once the reply can no longer change.
    pub fn is_finished(&self) -> bool {
        matches!(self, StreamState::Complete | StreamState::Failed)
    }
}

/// Drives a [`Renderer`] from streamed chunks.
#[derive(Debug)]
pub struct StreamingRenderer {
    buffer: RenderBuffer,
    state: StreamState,
    chunks: usize,
    reasoning_chars: usize,
    typing_delay: Duration,
}

impl StreamingRenderer {
    /// Creates an idle renderer.
    pub fn new() -> Self {
        Self {
            buffer: RenderBuffer::new(),
            state: StreamState::Idle,
            chunks: 0,
            reasoning_chars: 0,
            typing_delay: Duration::ZERO,
        }
    }

    /// Sets the pause the caller should take after each displayed chunk.
    pub fn with_typing_delay(mut self, typing_delay: Duration) -> Self {
        self.typing_delay = typing_delay;
        self
    }

    /// The pause to take after each displayed chunk.
    pub fn typing_delay(&self) -> Duration {
        self.typing_delay
    }

    /// The current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The text received so far.
    pub fn text(&self) -> &str {
        self.buffer.as_str()
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &RenderBuffer {
        &self.buffer
    }

    /// Number of text chunks received.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Appends a chunk of reply text and displays whatever became stable.
    pub fn push_chunk(&mut self, chunk: &str, renderer: &mut dyn Renderer) -> Result<()> {
        self.begin()?;
        self.chunks += 1;
        self.buffer.push(chunk);
        self.flush(renderer);
        Ok(())
    }

    /// Displays a chunk of reasoning.  Reasoning is not part of the reply text.
    pub fn push_reasoning(&mut self, text: &str, renderer: &mut dyn Renderer) -> Result<()> {
        self.begin()?;
        self.reasoning_chars += text.chars().count();
        renderer.print_thinking(text);
        Ok(())
    }

    /// Displays the stable prefix of unflushed text.  Returns how many spans
    /// were printed; an unchanged buffer prints nothing.
    pub fn flush(&mut self, renderer: &mut dyn Renderer) -> usize {
        let spans = self.buffer.flush_stable();
        for span in &spans {
            renderer.print_span(span);
        }
        spans.len()
    }

    /// Ends the reply normally, flushing everything, and returns its text.
    pub fn complete(&mut self, renderer: &mut dyn Renderer) -> Result<String> {
        self.finish(StreamState::Complete)?;
        for span in self.buffer.flush_all() {
            renderer.print_span(&span);
        }
        renderer.finish_response();
        tracing::debug!(
            chunks = self.chunks,
            bytes = self.buffer.len(),
            reasoning_chars = self.reasoning_chars,
            "stream complete"
        );
        Ok(self.buffer.as_str().to_string())
    }

    /// Ends the reply because the user interrupted it.
    ///
    /// Returns the partial text with [`INTERRUPTED_MARKER`] appended, or an
    /// empty string if no text had arrived.
    pub fn interrupt(&mut self, renderer: &mut dyn Renderer) -> Result<String> {
        self.finish(StreamState::Failed)?;
        self.flush(renderer);
        renderer.print_interrupted();
        Ok(self.partial_with_marker(INTERRUPTED_MARKER))
    }

    /// Ends the reply because of a transport or decoding error.
    ///
    /// Returns the partial text with a marker naming the error appended, or
    /// an empty string if no text had arrived.  Reporting the error itself is
    /// left to the caller.
    pub fn fail(&mut self, error: &Error, renderer: &mut dyn Renderer) -> Result<String> {
        self.finish(StreamState::Failed)?;
        self.flush(renderer);
        renderer.finish_response();
        Ok(self.partial_with_marker(&format!("[response incomplete: {error}]")))
    }

    fn begin(&mut self) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.state = StreamState::Streaming;
                Ok(())
            }
            StreamState::Streaming => Ok(()),
            StreamState::Complete | StreamState::Failed => Err(Error::invalid_state(
                "cannot add to a reply that has already finished",
            )),
        }
    }

    fn finish(&mut self, state: StreamState) -> Result<()> {
        if self.state.is_finished() {
            return Err(Error::invalid_state("reply has already finished"));
        }
        self.state = state;
        Ok(())
    }

    fn partial_with_marker(&self, marker: &str) -> String {
        let partial = self.buffer.as_str();
        if partial.trim().is_empty() {
            return String::new();
        }
        format!("{partial}\n\n{marker}")
    }
}

impl Default for StreamingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::{Span, SpanStyle};
    use crate::render::RecordingRenderer;

    #[test]
    fn lifecycle() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        assert_eq!(stream.state(), StreamState::Idle);

        stream.push_chunk("He", &mut renderer).unwrap();
        assert_eq!(stream.state(), StreamState::Streaming);
        stream.push_chunk("llo, **wor", &mut renderer).unwrap();
        assert_eq!(renderer.text(), "Hello, ");
        assert!(renderer.spans.iter().all(|s| s.style == SpanStyle::Plain));

        stream.push_chunk("ld**!", &mut renderer).unwrap();
        assert_eq!(
            renderer.spans.last(),
            Some(&Span::new(SpanStyle::Plain, "!"))
        );
        assert!(
            renderer
                .spans
                .contains(&Span::new(SpanStyle::Bold, "**world**"))
        );

        let text = stream.complete(&mut renderer).unwrap();
        assert_eq!(text, "Hello, **world**!");
        assert_eq!(renderer.text(), text);
        assert_eq!(renderer.finished, 1);
        assert_eq!(stream.state(), StreamState::Complete);
        assert_eq!(stream.chunks(), 3);

        assert!(stream.push_chunk("late", &mut renderer).unwrap_err().is_invalid_state());
        assert!(stream.complete(&mut renderer).unwrap_err().is_invalid_state());
    }

    #[test]
    fn repeated_flush_prints_nothing() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        stream.push_chunk("a `b", &mut renderer).unwrap();
        let before = renderer.spans.len();
        assert_eq!(stream.flush(&mut renderer), 0);
        assert_eq!(stream.flush(&mut renderer), 0);
        assert_eq!(renderer.spans.len(), before);
    }

    #[test]
    fn completion_flushes_unterminated_tokens_as_plain() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        stream.push_chunk("5 **", &mut renderer).unwrap();
        let text = stream.complete(&mut renderer).unwrap();
        assert_eq!(text, "5 **");
        assert_eq!(renderer.text(), "5 **");
        assert!(renderer.spans.iter().all(|s| s.style == SpanStyle::Plain));
    }

    #[test]
    fn interrupt_keeps_partial_with_marker() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        stream.push_chunk("partial **answ", &mut renderer).unwrap();
        let text = stream.interrupt(&mut renderer).unwrap();
        assert_eq!(text, "partial **answ\n\n[interrupted]");
        assert_eq!(renderer.text(), "partial ");
        assert_eq!(renderer.interrupted, 1);
        assert_eq!(stream.state(), StreamState::Failed);
    }

    #[test]
    fn failure_before_any_text_returns_nothing() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        let err = Error::streaming("connection reset", None);
        assert_eq!(stream.fail(&err, &mut renderer).unwrap(), "");
        assert!(stream.fail(&err, &mut renderer).unwrap_err().is_invalid_state());
    }

    #[test]
    fn failure_marker_names_error() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        stream.push_chunk("so far", &mut renderer).unwrap();
        let err = Error::streaming("connection reset", None);
        let text = stream.fail(&err, &mut renderer).unwrap();
        assert!(text.starts_with("so far\n\n[response incomplete: "));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn reasoning_shown_but_not_kept() {
        let mut renderer = RecordingRenderer::new();
        let mut stream = StreamingRenderer::new();
        stream.push_reasoning("thinking...", &mut renderer).unwrap();
        assert_eq!(stream.state(), StreamState::Streaming);
        stream.push_chunk("42", &mut renderer).unwrap();
        assert_eq!(stream.complete(&mut renderer).unwrap(), "42");
        assert_eq!(renderer.thinking, "thinking...");
    }
}
