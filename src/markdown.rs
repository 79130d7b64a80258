//! Incremental Markdown scanning for streamed text.
//!
//! A [`RenderBuffer`] accumulates the raw text of a reply and keeps a second
//! cursor marking how much of it has been handed to the terminal.  Each flush
//! scans only the unflushed tail and emits the longest prefix whose formatting
//! can no longer change: an opening `**` is held back until its closing `**`
//! arrives (or the line ends), `_` and `__` behave the same way unless they
//! sit inside a word, a line starting with `` ` `` or `#` is held
//! until it is clear whether it opens a code fence or a heading, and so on.
//!
//! Every byte is emitted exactly once, in order, so concatenating the text of
//! all emitted [`Span`]s always reproduces the buffer.

/// How a span of text should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanStyle {
    /// Ordinary text.
    Plain,
    /// `**bold**` or `__bold__`, markers included.
    Bold,
    /// `*italic*` or `_italic_`, markers included.
    Italic,
    /// `` `code` ``, backticks included.
    InlineCode,
    /// A heading line (or part of one) with its level.
    Heading(u8),
    /// A code fence line, opening or closing, newline included.
    Fence,
    /// A line inside a fenced code block.
    Code,
}

/// A run of flushed text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Presentation of the text.
    pub style: SpanStyle,
    /// The raw text, exactly as received.
    pub text: String,
}

impl Span {
    /// Creates a span.
    pub fn new(style: SpanStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

impl SpanStyle {
    /// Whether two adjacent spans of this style can be joined into one.
    ///
    /// Delimited styles stay one token per span so their markers can be
    /// stripped.
    fn joins(self) -> bool {
        matches!(self, SpanStyle::Plain | SpanStyle::Heading(_) | SpanStyle::Code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Start,
    Inline,
    Heading(u8),
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The rest could still change shape; stop here.
    Hold,
    /// Change line state without consuming input.
    Switch(LineState),
    /// Emit `len` bytes with `style`, then move to `next`.
    Emit {
        style: SpanStyle,
        len: usize,
        next: LineState,
        toggle_fence: bool,
    },
}

impl Step {
    fn emit(style: SpanStyle, len: usize, next: LineState) -> Self {
        Step::Emit {
            style,
            len,
            next,
            toggle_fence: false,
        }
    }

    fn fence(len: usize) -> Self {
        Step::Emit {
            style: SpanStyle::Fence,
            len,
            next: LineState::Start,
            toggle_fence: true,
        }
    }
}

/// Raw text plus a flushed cursor.
///
/// Invariant: `flushed_len() <= len()`, and `flushed_len()` always sits on a
/// character boundary.
#[derive(Debug, Clone)]
pub struct RenderBuffer {
    raw: String,
    flushed: usize,
    line: LineState,
    in_fence: bool,
}

impl RenderBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            raw: String::new(),
            flushed: 0,
            line: LineState::Start,
            in_fence: false,
        }
    }

    /// Appends a chunk of streamed text.
    pub fn push(&mut self, chunk: &str) {
        self.raw.push_str(chunk);
    }

    /// All text received so far.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Length of all text received so far, in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// How many bytes have been flushed.
    pub fn flushed_len(&self) -> usize {
        self.flushed
    }

    /// Text received but not yet flushed.
    pub fn pending(&self) -> &str {
        &self.raw[self.flushed..]
    }

    /// Returns true while inside an unterminated code fence.
    pub fn in_code_block(&self) -> bool {
        self.in_fence
    }

    /// Flushes the stable prefix of the unflushed text.
    ///
    /// Calling this again without pushing more text returns nothing.
    pub fn flush_stable(&mut self) -> Vec<Span> {
        self.flush(false)
    }

    /// Flushes everything, treating unterminated constructs as plain text.
    pub fn flush_all(&mut self) -> Vec<Span> {
        self.flush(true)
    }

    /// Consumes the buffer, returning the accumulated text.
    pub fn into_string(self) -> String {
        self.raw
    }

    fn flush(&mut self, all: bool) -> Vec<Span> {
        let mut spans: Vec<Span> = Vec::new();
        while self.flushed < self.raw.len() {
            let step = {
                let rest = &self.raw[self.flushed..];
                match self.line {
                    LineState::Start => line_start_step(rest, self.in_fence, all),
                    LineState::Inline => inline_step(rest, &self.raw[..self.flushed], all),
                    LineState::Heading(level) => {
                        line_step(rest, SpanStyle::Heading(level), LineState::Heading(level))
                    }
                    LineState::Code => line_step(rest, SpanStyle::Code, LineState::Code),
                }
            };
            match step {
                Step::Hold => break,
                Step::Switch(line) => self.line = line,
                Step::Emit {
                    style,
                    len,
                    next,
                    toggle_fence,
                } => {
                    let text = &self.raw[self.flushed..self.flushed + len];
                    match spans.last_mut() {
                        Some(last) if last.style == style && style.joins() => {
                            last.text.push_str(text)
                        }
                        _ => spans.push(Span::new(style, text)),
                    }
                    self.flushed += len;
                    self.line = next;
                    if toggle_fence {
                        self.in_fence = !self.in_fence;
                    }
                }
            }
        }
        spans
    }
}

impl Default for RenderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides what the line beginning at `rest` is.
fn line_start_step(rest: &str, in_fence: bool, all: bool) -> Step {
    let ticks = rest.bytes().take_while(|b| *b == b'`').count();
    let line_end = rest.find('\n');

    if in_fence {
        if ticks >= 3 {
            let line = &rest[..line_end.unwrap_or(rest.len())];
            let closing = line.trim_end().bytes().all(|b| b == b'`');
            return match (closing, line_end) {
                (true, Some(nl)) => Step::fence(nl + 1),
                (true, None) if all => Step::fence(rest.len()),
                (true, None) => Step::Hold,
                (false, _) => Step::Switch(LineState::Code),
            };
        }
        if ticks == rest.len() && !all {
            return Step::Hold;
        }
        return Step::Switch(LineState::Code);
    }

    if ticks >= 3 {
        return match line_end {
            Some(nl) => Step::fence(nl + 1),
            None if all => Step::fence(rest.len()),
            None => Step::Hold,
        };
    }
    if ticks > 0 && ticks == rest.len() && !all {
        return Step::Hold;
    }

    let hashes = rest.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) {
        return match rest.as_bytes().get(hashes) {
            Some(b' ') | Some(b'\t') => Step::Switch(LineState::Heading(hashes as u8)),
            Some(_) => Step::Switch(LineState::Inline),
            None if all => Step::Switch(LineState::Inline),
            None => Step::Hold,
        };
    }
    Step::Switch(LineState::Inline)
}

/// Emits the rest of a heading or code line.  Nothing inside can change shape.
fn line_step(rest: &str, style: SpanStyle, same: LineState) -> Step {
    match rest.find('\n') {
        Some(nl) => Step::emit(style, nl + 1, LineState::Start),
        None => Step::emit(style, rest.len(), same),
    }
}

/// Scans inline text for emphasis and `` `code` ``.
///
/// `head` is the already flushed text in front of `rest`.
fn inline_step(rest: &str, head: &str, all: bool) -> Step {
    let (line, complete) = match rest.find('\n') {
        Some(nl) => (&rest[..nl], true),
        None => (rest, false),
    };
    // Once the line is complete (or the stream is over) an unmatched opener
    // can only be literal text.
    let settled = complete || all;
    let plain_until = |i: usize| {
        if i > 0 {
            Step::emit(SpanStyle::Plain, i, LineState::Inline)
        } else {
            Step::Hold
        }
    };
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'`' => {
                if let Some(close) = line[i + 1..].find('`') {
                    return match i {
                        0 => Step::emit(SpanStyle::InlineCode, close + 2, LineState::Inline),
                        _ => plain_until(i),
                    };
                }
                if !settled {
                    return plain_until(i);
                }
                i += 1;
            }
            marker @ (b'*' | b'_') => {
                if marker == b'_' && inside_word(head, &line[..i]) {
                    i += line[i..].bytes().take_while(|b| *b == b'_').count();
                    continue;
                }
                match bytes.get(i + 1) {
                    None => {
                        if !settled {
                            return plain_until(i);
                        }
                        i += 1;
                    }
                    Some(b) if *b == marker => {
                        if let Some(close) = find_closer(&line[i + 2..], &line[i..i + 2]) {
                            return match i {
                                0 => Step::emit(SpanStyle::Bold, close + 4, LineState::Inline),
                                _ => plain_until(i),
                            };
                        }
                        if !settled {
                            return plain_until(i);
                        }
                        i += 2;
                    }
                    Some(b) if b.is_ascii_whitespace() => i += 1,
                    Some(_) => {
                        if let Some(close) = find_closer(&line[i + 1..], &line[i..i + 1]) {
                            return match i {
                                0 => Step::emit(SpanStyle::Italic, close + 2, LineState::Inline),
                                _ => plain_until(i),
                            };
                        }
                        if !settled {
                            return plain_until(i);
                        }
                        i += 1;
                    }
                }
            }
            _ => i += 1,
        }
    }
    if complete {
        Step::emit(SpanStyle::Plain, line.len() + 1, LineState::Start)
    } else {
        Step::emit(SpanStyle::Plain, line.len(), LineState::Inline)
    }
}

/// True when an underscore run starting after `head` and `before` follows a
/// letter or digit, as in `snake_case` or `max__len`.
fn inside_word(head: &str, before: &str) -> bool {
    let before = before.trim_end_matches('_');
    let last = match before.chars().next_back() {
        Some(c) => Some(c),
        None => head.trim_end_matches('_').chars().next_back(),
    };
    last.is_some_and(char::is_alphanumeric)
}

/// Finds `marker` in `body` after at least one character of content.
fn find_closer(body: &str, marker: &str) -> Option<usize> {
    let first = body.chars().next()?.len_utf8();
    body[first..].find(marker).map(|pos| pos + first)
}
