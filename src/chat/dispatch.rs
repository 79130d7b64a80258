//! Carrying out parsed commands against a session.

use crate::chat::commands::{ChatCommand, help_text};
use crate::chat::input::{
    ClipboardSource, LineSource, confirm, read_file_input, read_multiline, resolve_path,
};
use crate::chat::session::{ChatSession, SessionStats};
use crate::client::ChatBackend;
use crate::render::Renderer;
use crate::types::{KnownModel, Model};
use crate::Result;

/// What the control loop should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Send this text as a chat message.
    Send(String),
    /// Leave the loop.
    Quit,
}

/// Runs commands that need more than the session: follow-up prompts and
/// text sources.
pub struct Dispatcher<'a> {
    lines: &'a mut dyn LineSource,
    clipboard: &'a mut dyn ClipboardSource,
}

impl<'a> Dispatcher<'a> {
    /// Creates a dispatcher reading follow-up input from `lines`.
    pub fn new(lines: &'a mut dyn LineSource, clipboard: &'a mut dyn ClipboardSource) -> Self {
        Self { lines, clipboard }
    }

    /// Runs `command`.
    ///
    /// Command failures the user can act on (a bad path, an unknown model)
    /// are returned as errors; the session is left as it was.
    pub fn dispatch<B: ChatBackend>(
        &mut self,
        command: ChatCommand,
        session: &mut ChatSession<B>,
        renderer: &mut dyn Renderer,
    ) -> Result<Flow> {
        tracing::debug!(?command, "dispatching command");
        match command {
            ChatCommand::Help => {
                renderer.print_info(help_text());
                Ok(Flow::Continue)
            }
            ChatCommand::History => {
                renderer.print_info(&format_stats(&session.stats()));
                Ok(Flow::Continue)
            }
            ChatCommand::Save(path) => {
                save(session, path.as_deref(), renderer)?;
                Ok(Flow::Continue)
            }
            ChatCommand::Load(path) => {
                let resolved = resolve_path(&path);
                let count = session.load_transcript(&resolved)?;
                renderer.print_info(&format!(
                    "Loaded {count} messages from {}",
                    resolved.display()
                ));
                Ok(Flow::Continue)
            }
            ChatCommand::Clear => {
                self.clear(session, renderer)?;
                Ok(Flow::Continue)
            }
            ChatCommand::Model(None) => {
                renderer.print_info(&format_models(session.model()));
                Ok(Flow::Continue)
            }
            ChatCommand::Model(Some(name)) => {
                let change = session.switch_model(&name)?;
                if let Some(warning) = &change.warning {
                    tracing::warn!(model = %change.model, "{warning}");
                    renderer.print_warning(warning);
                }
                renderer.print_info(&format!("Switched to model: {}", change.model));
                Ok(Flow::Continue)
            }
            ChatCommand::Quit => self.quit(session, renderer),
            ChatCommand::Multiline => {
                renderer.print_info("Multiline input: finish with :end, :e or an empty line.");
                match read_multiline(&mut *self.lines)? {
                    Some(text) => Ok(Flow::Send(text)),
                    None => {
                        renderer.print_info("Nothing entered; no message sent.");
                        Ok(Flow::Continue)
                    }
                }
            }
            ChatCommand::File(path) => {
                let (resolved, content) = read_file_input(&path)?;
                if content.trim().is_empty() {
                    renderer.print_info(&format!(
                        "{} is empty; no message sent.",
                        resolved.display()
                    ));
                    return Ok(Flow::Continue);
                }
                renderer.print_info(&format!(
                    "Imported {} characters from {}",
                    content.chars().count(),
                    resolved.display()
                ));
                Ok(Flow::Send(content))
            }
            ChatCommand::Clipboard => {
                let content = self.clipboard.read_text()?;
                if content.trim().is_empty() {
                    renderer.print_info("Clipboard is empty; no message sent.");
                    return Ok(Flow::Continue);
                }
                renderer.print_info(&format!(
                    "Imported {} characters from the clipboard",
                    content.chars().count()
                ));
                Ok(Flow::Send(content))
            }
            ChatCommand::Invalid(message) => {
                renderer.print_error(&message);
                Ok(Flow::Continue)
            }
        }
    }

    fn clear<B: ChatBackend>(
        &mut self,
        session: &mut ChatSession<B>,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        if session.message_count() == 0 {
            renderer.print_info("Conversation is already empty.");
            return Ok(());
        }
        let question = format!(
            "Clear {} messages from this conversation?",
            session.message_count()
        );
        if confirm(&mut *self.lines, &question)? {
            session.clear();
            renderer.print_info("Conversation cleared.");
        } else {
            renderer.print_info("Kept the conversation.");
        }
        Ok(())
    }

    fn quit<B: ChatBackend>(
        &mut self,
        session: &mut ChatSession<B>,
        renderer: &mut dyn Renderer,
    ) -> Result<Flow> {
        if session.message_count() > 0
            && confirm(&mut *self.lines, "Save the conversation before quitting?")?
        {
            // Stay in the loop when the save failed.
            if let Err(err) = save(session, None, renderer) {
                renderer.print_error(&format!("Failed to save transcript: {err}"));
                return Ok(Flow::Continue);
            }
        }
        renderer.print_info("Goodbye!");
        Ok(Flow::Quit)
    }
}

fn save<B: ChatBackend>(
    session: &ChatSession<B>,
    path: Option<&str>,
    renderer: &mut dyn Renderer,
) -> Result<()> {
    if session.message_count() == 0 {
        renderer.print_info("Nothing to save yet.");
        return Ok(());
    }
    let resolved = path.map(resolve_path);
    let written = session.save_transcript(resolved.as_deref())?;
    renderer.print_info(&format!("Transcript saved to {}", written.display()));
    Ok(())
}

/// Formats session statistics for `/history`.
pub fn format_stats(stats: &SessionStats) -> String {
    let mut out = String::from("Session statistics:\n");
    out.push_str(&format!("  Model: {}\n", stats.model));
    out.push_str(&format!("  Messages: {}\n", stats.message_count));
    out.push_str(&format!("  Exchanges: {}\n", stats.turn_count));
    let policy = &stats.context_policy;
    let context = match (policy.max_turns, policy.max_chars) {
        (None, None) => "full history".to_string(),
        (Some(turns), None) => format!("last {turns} exchanges"),
        (None, Some(chars)) => format!("up to {chars} characters"),
        (Some(turns), Some(chars)) => format!("last {turns} exchanges, up to {chars} characters"),
    };
    out.push_str(&format!("  Context: {context}\n"));
    match stats.system_prompt.as_deref() {
        Some(prompt) => out.push_str(&format!("  System prompt: {prompt}\n")),
        None => out.push_str("  System prompt: (none)\n"),
    }
    out.push_str(&format!(
        "  Requests: {} ({} interrupted, {} failed)",
        stats.total_requests, stats.interrupted_responses, stats.failed_responses
    ));
    out
}

/// Lists the known models for `/model`, marking `current`.
pub fn format_models(current: &Model) -> String {
    let mut out = String::from("Available models:\n");
    for model in KnownModel::ALL {
        let marker = if current == &Model::Known(model) { "*" } else { " " };
        out.push_str(&format!(
            "  {marker} {:<20} {}\n",
            model.as_str(),
            model.description()
        ));
    }
    if !current.is_known() {
        out.push_str(&format!("  * {current} (custom)\n"));
    }
    out.push_str("Use /model <name> to switch.");
    out
}
