//! Terminal output for streamed chat replies.
//!
//! The streaming layer hands stable [`Span`]s to a [`Renderer`]; what the
//! renderer does with them is up to the implementation.  [`TerminalRenderer`]
//! writes ANSI-styled text to a terminal, or the raw Markdown when color is
//! off.  [`RecordingRenderer`] keeps everything in memory.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::markdown::{Span, SpanStyle};

/// ANSI escape code for bold text.
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for reasoning and code fences).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text.
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for headings).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for inline code).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for code blocks).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering streaming output.
///
/// This abstraction allows for different rendering strategies:
/// - ANSI-styled terminal output
/// - Raw Markdown (for piping/redirecting)
/// - In-memory capture for tests
pub trait Renderer: Send {
    /// Called before the first span of a reply.
    fn start_response(&mut self, model: &str) {
        _ = model;
    }

    /// Print a span of reply text whose formatting is settled.
    fn print_span(&mut self, span: &Span);

    /// Print a chunk of reasoning text.
    ///
    /// Reasoning is displayed dim/italic to distinguish it from the reply.
    fn print_thinking(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a warning.
    fn print_warning(&mut self, warning: &str) {
        self.print_info(warning);
    }

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Terminal renderer with optional ANSI styling.
///
/// With color on, Markdown markers around bold, italic and inline code are
/// hidden and the text is styled instead.  With color off the raw Markdown is
/// written unchanged.
pub struct TerminalRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    in_thinking: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl TerminalRenderer<Stdout> {
    /// Creates a new TerminalRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new TerminalRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::to_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn to_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            in_thinking: false,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Returns true when ANSI styling is on.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Consumes the renderer, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        // Terminal write failures have nowhere better to go.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    fn styled(&mut self, codes: &str, text: &str) {
        if self.use_color {
            let styled = format!("{codes}{text}{ANSI_RESET}");
            self.write(&styled);
            self.line_start = text.ends_with('\n');
        } else {
            self.write(text);
        }
    }

    fn reset_thinking(&mut self) {
        if self.in_thinking {
            if self.use_color {
                self.write(ANSI_RESET);
            }
            self.write("\n");
            self.in_thinking = false;
        }
    }

    fn newline_if_needed(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for TerminalRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips `width` marker bytes from each end of a complete inline span.
fn inner(text: &str, width: usize) -> &str {
    match text.len().checked_sub(width) {
        Some(end) if end >= width => text.get(width..end).unwrap_or(text),
        _ => text,
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn start_response(&mut self, _model: &str) {
        self.line_start = true;
    }

    fn print_span(&mut self, span: &Span) {
        self.reset_thinking();
        if !self.use_color {
            self.write(&span.text);
            return;
        }
        match span.style {
            SpanStyle::Plain => self.write(&span.text),
            SpanStyle::Bold => {
                let text = inner(&span.text, 2).to_string();
                self.styled(ANSI_BOLD, &text);
            }
            SpanStyle::Italic => {
                let text = inner(&span.text, 1).to_string();
                self.styled(ANSI_ITALIC, &text);
            }
            SpanStyle::InlineCode => {
                let text = inner(&span.text, 1).to_string();
                self.styled(ANSI_YELLOW, &text);
            }
            SpanStyle::Heading(_) => {
                let codes = format!("{ANSI_BOLD}{ANSI_CYAN}");
                self.styled(&codes, &span.text);
            }
            SpanStyle::Fence => self.styled(ANSI_DIM, &span.text),
            SpanStyle::Code => self.styled(ANSI_GREEN, &span.text),
        }
    }

    fn print_thinking(&mut self, text: &str) {
        if !self.in_thinking {
            if self.use_color {
                self.write(ANSI_DIM);
                self.write(ANSI_ITALIC);
            } else {
                self.write("[thinking] ");
            }
            self.in_thinking = true;
        }
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        self.reset_thinking();
        self.newline_if_needed();
        let message = format!("Error: {error}\n");
        self.styled(ANSI_RED, &message);
    }

    fn print_info(&mut self, info: &str) {
        self.reset_thinking();
        self.newline_if_needed();
        self.write(info);
        if !info.ends_with('\n') {
            self.write("\n");
        }
    }

    fn print_warning(&mut self, warning: &str) {
        self.reset_thinking();
        self.newline_if_needed();
        let message = format!("Warning: {warning}\n");
        self.styled(ANSI_YELLOW, &message);
    }

    fn finish_response(&mut self) {
        self.reset_thinking();
        self.newline_if_needed();
    }

    fn print_interrupted(&mut self) {
        self.reset_thinking();
        self.newline_if_needed();
        self.write("[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Renderer that records everything in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    /// Spans in the order they were printed.
    pub spans: Vec<Span>,
    /// Reasoning text.
    pub thinking: String,
    /// Error messages.
    pub errors: Vec<String>,
    /// Informational messages.
    pub infos: Vec<String>,
    /// Warnings.
    pub warnings: Vec<String>,
    /// Number of completed responses.
    pub finished: usize,
    /// Number of interrupted responses.
    pub interrupted: usize,
}

impl RecordingRenderer {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All printed span text, concatenated.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Returns true if any info message contains `needle`.
    pub fn saw_info(&self, needle: &str) -> bool {
        self.infos.iter().any(|i| i.contains(needle))
    }
}

impl Renderer for RecordingRenderer {
    fn print_span(&mut self, span: &Span) {
        self.spans.push(span.clone());
    }

    fn print_thinking(&mut self, text: &str) {
        self.thinking.push_str(text);
    }

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, info: &str) {
        self.infos.push(info.to_string());
    }

    fn print_warning(&mut self, warning: &str) {
        self.warnings.push(warning.to_string());
    }

    fn finish_response(&mut self) {
        self.finished += 1;
    }

    fn print_interrupted(&mut self) {
        self.interrupted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(use_color: bool, spans: &[Span]) -> String {
        let mut renderer = TerminalRenderer::to_writer(Vec::new(), use_color);
        for span in spans {
            renderer.print_span(span);
        }
        renderer.finish_response();
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = TerminalRenderer::new();
        assert!(renderer.use_color());
    }

    #[test]
    fn plain_output_keeps_markdown() {
        let out = rendered(
            false,
            &[
                Span::new(SpanStyle::Plain, "Hello, "),
                Span::new(SpanStyle::Bold, "**world**"),
            ],
        );
        assert_eq!(out, "Hello, **world**\n");
    }

    #[test]
    fn color_output_hides_markers() {
        let out = rendered(
            true,
            &[
                Span::new(SpanStyle::Plain, "Hello, "),
                Span::new(SpanStyle::Bold, "**world**"),
                Span::new(SpanStyle::Plain, "!\n"),
            ],
        );
        assert_eq!(out, "Hello, \x1b[1mworld\x1b[0m!\n");
    }

    #[test]
    fn separate_emphasis_spans_hide_every_marker() {
        let mut buffer = crate::RenderBuffer::new();
        buffer.push("**a****b** and *x**y* or __c__\n");
        let out = rendered(true, &buffer.flush_all());
        assert_eq!(
            out,
            "\x1b[1ma\x1b[0m\x1b[1mb\x1b[0m and \x1b[3mx\x1b[0m\x1b[3my\x1b[0m or \x1b[1mc\x1b[0m\n"
        );
        assert!(!out.contains('*'));
    }

    #[test]
    fn inline_code_colored() {
        let out = rendered(true, &[Span::new(SpanStyle::InlineCode, "`x`")]);
        assert_eq!(out, "\x1b[33mx\x1b[0m\n");
    }

    #[test]
    fn thinking_then_text_without_color() {
        let mut renderer = TerminalRenderer::to_writer(Vec::new(), false);
        renderer.print_thinking("let me see");
        renderer.print_span(&Span::new(SpanStyle::Plain, "answer"));
        renderer.finish_response();
        let out = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(out, "[thinking] let me see\nanswer\n");
    }

    #[test]
    fn interrupt_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let renderer = TerminalRenderer::to_writer(Vec::new(), false).with_interrupt(flag.clone());
        assert!(!renderer.should_interrupt());
        flag.store(true, Ordering::Relaxed);
        assert!(renderer.should_interrupt());
    }

    #[test]
    fn recorder_collects() {
        let mut recorder = RecordingRenderer::new();
        recorder.print_span(&Span::new(SpanStyle::Plain, "a"));
        recorder.print_span(&Span::new(SpanStyle::Italic, "*b*"));
        recorder.print_info("saved to x.md");
        recorder.finish_response();
        assert_eq!(recorder.text(), "a*b*");
        assert!(recorder.saw_info("x.md"));
        assert_eq!(recorder.finished, 1);
    }
}
