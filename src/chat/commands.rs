//! Command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/` and
//! input modes that start with `:`, allowing users to control the chat
//! session without sending messages to the API.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Display conversation statistics.
    History,

    /// Save the transcript, to the given path or a timestamped file.
    Save(Option<String>),

    /// Replace the conversation with a saved transcript.
    Load(String),

    /// Clear the conversation history (after confirmation).
    Clear,

    /// Switch model, or list models when no name is given.
    Model(Option<String>),

    /// Exit the chat application.
    Quit,

    /// Read a block of lines and send it as one message.
    Multiline,

    /// Send the contents of a file as one message.
    File(String),

    /// Send the clipboard contents as one message.
    Clipboard,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be treated as a regular message.  Unknown `/` commands parse as
/// [`ChatCommand::Invalid`]; unknown `:` input is a regular message.
///
/// # Examples
///
/// ```
/// # use chatting::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("q"), Some(ChatCommand::Quit));
/// assert!(parse_command("/model deepseek-reasoner").is_some());
/// assert!(parse_command(":)").is_none());
/// assert!(parse_command("Hello!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("exit") {
        return Some(ChatCommand::Quit);
    }

    if let Some(rest) = input.strip_prefix(':') {
        return parse_input_mode(rest);
    }

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => ChatCommand::Help,
        "history" | "stats" => ChatCommand::History,
        "save" => ChatCommand::Save(argument.map(|s| s.to_string())),
        "load" => match argument {
            Some(path) => ChatCommand::Load(path.to_string()),
            None => ChatCommand::Invalid("/load requires a file path".to_string()),
        },
        "clear" => ChatCommand::Clear,
        "model" => ChatCommand::Model(argument.map(|s| s.to_string())),
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!(
            "Unknown command: /{command} (type /help for commands)"
        )),
    };

    Some(result)
}

fn parse_input_mode(rest: &str) -> Option<ChatCommand> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let mode = parts.next().unwrap_or_default();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    match mode {
        "ml" => Some(ChatCommand::Multiline),
        "clip" => Some(ChatCommand::Clipboard),
        "file" => Some(match argument {
            Some(path) => ChatCommand::File(path.to_string()),
            None => ChatCommand::Invalid(":file requires a file path".to_string()),
        }),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /help                  Show this help message
  /history               Show conversation statistics
  /save [file]           Save the transcript (default: chat_<timestamp>.md)
  /load <file>           Replace the conversation with a saved transcript
  /clear                 Clear conversation history (asks for confirmation)
  /model [name]          Switch model, or list models
  /quit                  Exit the chat (also: q, exit, /exit)

Input modes:
  :ml                    Multiline input; finish with :end, :e or an empty line
  :file <path>           Send the contents of a file
  :clip                  Send the clipboard contents

Press Ctrl+C while a reply streams to stop it."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("EXIT"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear_and_history() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
    }

    #[test]
    fn parse_model() {
        assert_eq!(
            parse_command("/model deepseek-reasoner"),
            Some(ChatCommand::Model(Some("deepseek-reasoner".to_string())))
        );
        assert_eq!(
            parse_command("/model   deepseek-chat  "),
            Some(ChatCommand::Model(Some("deepseek-chat".to_string())))
        );
        assert_eq!(parse_command("/model"), Some(ChatCommand::Model(None)));
    }

    #[test]
    fn parse_save_and_load() {
        assert_eq!(parse_command("/save"), Some(ChatCommand::Save(None)));
        assert_eq!(
            parse_command("/save notes/today.md"),
            Some(ChatCommand::Save(Some("notes/today.md".to_string())))
        );
        assert_eq!(
            parse_command("/load chat_20261017_100000.md"),
            Some(ChatCommand::Load("chat_20261017_100000.md".to_string()))
        );
        assert!(matches!(
            parse_command("/load"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn unknown_slash_command_is_invalid() {
        assert!(matches!(
            parse_command("/frobnicate now"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("Unknown command: /frobnicate")
        ));
        assert!(matches!(parse_command("/"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn parse_input_modes() {
        assert_eq!(parse_command(":ml"), Some(ChatCommand::Multiline));
        assert_eq!(parse_command(":clip"), Some(ChatCommand::Clipboard));
        assert_eq!(
            parse_command(":file src/main.rs"),
            Some(ChatCommand::File("src/main.rs".to_string()))
        );
        assert!(matches!(
            parse_command(":file"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello there!"), None);
        assert_eq!(parse_command(":)"), None);
        assert_eq!(parse_command(":mlx"), None);
        assert_eq!(parse_command("quit smoking?"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        for needle in ["/quit", "/clear", "/model", "/save", ":ml", ":file", ":clip"] {
            assert!(help.contains(needle), "missing {needle}");
        }
    }
}
