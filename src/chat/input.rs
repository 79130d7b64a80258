//! Sources of user text besides the main prompt: follow-up lines,
//! multiline blocks, files and the clipboard.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::{Error, Result};

/// Lines that end multiline input, besides an empty line.
const MULTILINE_TERMINATORS: [&str; 2] = [":end", ":e"];

/// Something that can be asked for one more line of input.
pub trait LineSource {
    /// Shows `prompt` and reads a line.  Returns `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => Ok(None),
            Err(err) => Err(Error::io(
                "failed to read input",
                io::Error::other(err.to_string()),
            )),
        }
    }
}

/// Pre-recorded lines, for scripted sessions and tests.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedLines {
    /// Creates a source that will answer with `lines` in order.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Every prompt shown so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

/// Asks a yes/no question; only `y` or `yes` count as yes.
pub fn confirm(source: &mut dyn LineSource, question: &str) -> Result<bool> {
    let answer = source.read_line(&format!("{question} [y/N]: "))?;
    Ok(answer.is_some_and(|a| {
        let a = a.trim();
        a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes")
    }))
}

/// Reads numbered lines until `:end`, `:e`, an empty line or end of input.
///
/// Returns `None` when no lines were entered.
pub fn read_multiline(source: &mut dyn LineSource) -> Result<Option<String>> {
    let mut lines = Vec::new();
    loop {
        let prompt = format!("  {:2} | ", lines.len() + 1);
        let Some(line) = source.read_line(&prompt)? else {
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || MULTILINE_TERMINATORS.contains(&trimmed) {
            break;
        }
        lines.push(line);
    }
    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines.join("\n")))
    }
}

/// Resolves `path` against the working directory.
pub fn resolve_path(path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Reads a UTF-8 text file for sending as a message.
pub fn read_file_input(path: &str) -> Result<(PathBuf, String)> {
    let resolved = resolve_path(path);
    let content = fs::read_to_string(&resolved).map_err(|err| {
        let message = match err.kind() {
            io::ErrorKind::NotFound => format!("file not found: {}", resolved.display()),
            _ => format!("failed to read {}", resolved.display()),
        };
        Error::io(message, err)
    })?;
    tracing::debug!(path = %resolved.display(), chars = content.chars().count(), "read file input");
    Ok((resolved, content))
}

/// Somewhere text can be pasted from.
pub trait ClipboardSource {
    /// Returns the current text contents.
    fn read_text(&mut self) -> Result<String>;
}

/// The system clipboard.
///
/// Without the `clipboard` feature every read fails with `Unavailable`.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// Creates a handle to the system clipboard.
    pub fn new() -> Self {
        Self
    }
}

impl ClipboardSource for SystemClipboard {
    #[cfg(feature = "clipboard")]
    fn read_text(&mut self) -> Result<String> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|err| Error::unavailable(format!("clipboard is not accessible: {err}")))?;
        clipboard
            .get_text()
            .map_err(|err| Error::unavailable(format!("clipboard has no text: {err}")))
    }

    #[cfg(not(feature = "clipboard"))]
    fn read_text(&mut self) -> Result<String> {
        Err(Error::unavailable(
            "clipboard support was not compiled in (enable the `clipboard` feature)",
        ))
    }
}

/// A fixed clipboard, for tests and headless use.
#[derive(Debug, Default, Clone)]
pub struct StaticClipboard(pub Option<String>);

impl ClipboardSource for StaticClipboard {
    fn read_text(&mut self) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| Error::unavailable("no clipboard available"))
    }
}
