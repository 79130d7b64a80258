//! The ordered record of a conversation and its Markdown form.
//!
//! Saved transcripts are ordinary Markdown meant for people to read.  Each
//! turn is preceded by an HTML comment carrying its role, timestamp and the
//! byte length of its content, which is what [`Transcript::parse_markdown`]
//! keys on to read a file back.  The length lets a turn hold anything,
//! including another saved transcript.

use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::observability::{TRANSCRIPT_SAVE_ERRORS, TRANSCRIPT_SAVES};
use crate::types::{Model, Role, Turn, TurnState};
use crate::utils::time::{display_stamp, file_stamp, parse_rfc3339, rfc3339};
use crate::{Error, Result};

const TITLE: &str = "# Chat transcript";
const TURN_OPEN: &str = "<!-- turn role=\"";
const TURN_AT: &str = "\" at=\"";
const TURN_LEN: &str = "\" len=\"";
const TURN_CLOSE: &str = "\" -->";
const TURN_SEPARATOR: &str = "\n\n---\n\n";

/// Conversation history in insertion order.
///
/// At most one turn is in progress at a time, and it is always the last one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.
    ///
    /// Fails with `InvalidState` when both the existing last turn and `turn`
    /// are in progress.
    pub fn append(&mut self, turn: Turn) -> Result<()> {
        if turn.is_in_progress() && self.in_progress().is_some() {
            return Err(Error::invalid_state(
                "a turn is already in progress; finish or discard it first",
            ));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Removes every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// All turns, including an in-progress one.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Completed turns only.
    pub fn completed(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.state == TurnState::Complete)
    }

    /// Number of completed messages.
    pub fn message_count(&self) -> usize {
        self.completed().count()
    }

    /// Returns true if there are no completed messages.
    pub fn is_empty(&self) -> bool {
        self.message_count() == 0
    }

    /// Number of completed user/assistant pairs.
    pub fn turn_count(&self) -> usize {
        let completed: Vec<&Turn> = self.completed().collect();
        let mut count = 0;
        let mut i = 0;
        while i + 1 < completed.len() {
            if completed[i].role == Role::User && completed[i + 1].role == Role::Assistant {
                count += 1;
                i += 2;
            } else {
                i += 1;
            }
        }
        count
    }

    /// The in-progress turn, if any.
    pub fn in_progress(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.is_in_progress())
    }

    /// Finalizes the in-progress turn with `content`.
    pub fn complete_in_progress(&mut self, content: impl Into<String>) -> Result<&Turn> {
        let Some(turn) = self.turns.iter_mut().find(|t| t.is_in_progress()) else {
            return Err(Error::invalid_state("no turn is in progress"));
        };
        turn.content = content.into();
        turn.state = TurnState::Complete;
        Ok(turn)
    }

    /// Drops the in-progress turn, returning it.
    pub fn discard_in_progress(&mut self) -> Option<Turn> {
        let index = self.turns.iter().position(|t| t.is_in_progress())?;
        Some(self.turns.remove(index))
    }

    /// Removes the last turn if it is a completed turn with `role`.
    pub fn pop_last_if(&mut self, role: Role) -> Option<Turn> {
        match self.turns.last() {
            Some(last) if last.role == role && !last.is_in_progress() => self.turns.pop(),
            _ => None,
        }
    }

    /// Renders the completed turns as Markdown.
    ///
    /// The output depends only on the turns, `model` and `saved_at`.
    pub fn serialize(&self, model: &Model, saved_at: &OffsetDateTime) -> String {
        let mut out = String::new();
        out.push_str(TITLE);
        out.push_str("\n\n");
        out.push_str(&format!("**Date**: {}\n", display_stamp(saved_at)));
        out.push_str(&format!("**Model**: {model}\n"));
        out.push_str(&format!("**Turns**: {}", self.turn_count()));
        out.push_str(TURN_SEPARATOR);
        for turn in self.completed() {
            out.push_str(TURN_OPEN);
            out.push_str(turn.role.as_str());
            out.push_str(TURN_AT);
            out.push_str(&rfc3339(&turn.timestamp));
            out.push_str(TURN_LEN);
            out.push_str(&turn.content.len().to_string());
            out.push_str(TURN_CLOSE);
            out.push('\n');
            out.push_str(&format!("### {}\n\n", turn.role.label()));
            out.push_str(&turn.content);
            out.push_str(TURN_SEPARATOR);
        }
        out
    }

    /// Reads back a transcript produced by [`Transcript::serialize`].
    pub fn parse_markdown(text: &str) -> Result<Self> {
        let mut transcript = Transcript::new();
        let Some(start) = find_turn_start(text, 0) else {
            if text.starts_with(TITLE) {
                return Ok(transcript);
            }
            return Err(Error::validation(
                "not a saved chat transcript",
                Some("path".to_string()),
            ));
        };

        let mut rest = &text[start..];
        while !rest.is_empty() {
            let (marker, body) = rest.split_once('\n').unwrap_or((rest, ""));
            let (role, timestamp, len) = parse_marker(marker)?;
            let heading = format!("### {}\n\n", role.label());
            let body = body.strip_prefix(&heading).ok_or_else(|| {
                Error::validation(
                    format!("expected heading for {} turn", role.as_str()),
                    None,
                )
            })?;

            let (content, remaining) = match len {
                Some(len) => split_sized(body, len, role)?,
                None => split_unsized(body),
            };
            transcript.append(Turn::at(role, content, timestamp))?;
            rest = remaining;
        }
        Ok(transcript)
    }

    /// Writes the Markdown form to `path`.
    pub fn save_to(&self, path: &Path, model: &Model, saved_at: &OffsetDateTime) -> Result<()> {
        let text = self.serialize(model, saved_at);
        match fs::write(path, text) {
            Ok(()) => {
                TRANSCRIPT_SAVES.click();
                tracing::info!(
                    path = %path.display(),
                    messages = self.message_count(),
                    "transcript saved"
                );
                Ok(())
            }
            Err(err) => {
                TRANSCRIPT_SAVE_ERRORS.click();
                tracing::warn!(path = %path.display(), error = %err, "transcript save failed");
                Err(Error::io(
                    format!("failed to write transcript to {}", path.display()),
                    err,
                ))
            }
        }
    }

    /// Writes `chat_<YYYYMMDD>_<HHMMSS>.md` into `dir` and returns its path.
    pub fn save_to_dir(
        &self,
        dir: &Path,
        model: &Model,
        saved_at: &OffsetDateTime,
    ) -> Result<PathBuf> {
        let path = dir.join(file_name(saved_at));
        self.save_to(&path, model, saved_at)?;
        Ok(path)
    }

    /// Reads a transcript saved by [`Transcript::save_to`].
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read transcript {}", path.display()), err)
        })?;
        let transcript = Self::parse_markdown(&text)?;
        tracing::info!(
            path = %path.display(),
            messages = transcript.message_count(),
            "transcript loaded"
        );
        Ok(transcript)
    }
}

/// The file name a transcript saved at `saved_at` gets.
pub fn file_name(saved_at: &OffsetDateTime) -> String {
    format!("chat_{}.md", file_stamp(saved_at))
}

/// Finds a turn marker at the start of a line, at or after `from`.
fn find_turn_start(text: &str, from: usize) -> Option<usize> {
    let mut offset = from;
    while let Some(found) = text[offset..].find(TURN_OPEN) {
        let at = offset + found;
        if at == 0 || text.as_bytes()[at - 1] == b'\n' {
            return Some(at);
        }
        offset = at + TURN_OPEN.len();
    }
    None
}

/// Reads a marker line.  The length is absent in hand-written markers.
fn parse_marker(line: &str) -> Result<(Role, OffsetDateTime, Option<usize>)> {
    let malformed = || Error::validation(format!("malformed turn marker: {line}"), None);
    let attrs = line
        .strip_prefix(TURN_OPEN)
        .and_then(|l| l.strip_suffix(TURN_CLOSE))
        .ok_or_else(malformed)?;
    let (role, rest) = attrs.split_once(TURN_AT).ok_or_else(malformed)?;
    let role = match Role::from_wire(role) {
        Some(Role::System) | None => return Err(malformed()),
        Some(role) => role,
    };
    let (at, len) = match rest.split_once(TURN_LEN) {
        Some((at, len)) => (at, Some(len.parse::<usize>().map_err(|_| malformed())?)),
        None => (rest, None),
    };
    let timestamp = parse_rfc3339(at).ok_or_else(malformed)?;
    Ok((role, timestamp, len))
}

/// Takes exactly `len` bytes of content, then the separator.
fn split_sized(body: &str, len: usize, role: Role) -> Result<(&str, &str)> {
    let mismatch = || {
        Error::validation(
            format!(
                "{} turn does not match its recorded length of {len} bytes",
                role.as_str()
            ),
            None,
        )
    };
    let content = body.get(..len).ok_or_else(mismatch)?;
    let after = &body[len..];
    let remaining = if let Some(remaining) = after.strip_prefix(TURN_SEPARATOR) {
        remaining
    } else if after.is_empty() || after == "\n\n---\n" {
        ""
    } else {
        return Err(mismatch());
    };
    Ok((content, remaining))
}

/// Content runs until the next marker that follows a separator.
fn split_unsized(body: &str) -> (&str, &str) {
    let next = format!("{TURN_SEPARATOR}{TURN_OPEN}");
    match body.find(&next) {
        Some(end) => (&body[..end], &body[end + TURN_SEPARATOR.len()..]),
        None => {
            let content = body
                .strip_suffix(TURN_SEPARATOR)
                .or_else(|| body.strip_suffix("\n\n---\n"))
                .unwrap_or(body);
            (content, "")
        }
    }
}
