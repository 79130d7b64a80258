//! Configuration types for the chat application.
//!
//! [`SessionConfig`] is read once from the environment and never changes.
//! [`ChatArgs`] are the command-line flags, parsed via `arrrg`, and
//! [`ChatConfig`] holds the resolved presentation and context settings.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::chat::context::{ContextPolicy, DEFAULT_SYSTEM_PROMPT};
use crate::client::{DEFAULT_API_BASE, chat_endpoint};
use crate::types::{KnownModel, Model};
use crate::{Error, Result};

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";

/// Environment variable overriding the API base URL.
pub const API_BASE_VAR: &str = "API_BASE";

/// Environment variable naming the starting model.
pub const DEFAULT_MODEL_VAR: &str = "DEFAULT_MODEL";

/// Settings fixed for the lifetime of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bearer token for the API.
    pub api_key: String,
    /// Base URL the `chat/completions` path is resolved against.
    pub api_base: String,
    /// The model a session starts with.
    pub default_model: Model,
}

impl SessionConfig {
    /// Reads the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    ///
    /// Fails with a `Config` error when the API key is missing or empty, when
    /// the API base is not a URL, or when the default model is unsupported.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::config(
                    format!("{API_KEY_VAR} is not set; add it to the environment or a .env file"),
                    Some(API_KEY_VAR.to_string()),
                )
            })?;

        let api_base = lookup(API_BASE_VAR)
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        chat_endpoint(&api_base).map_err(|err| {
            Error::config(
                format!("{API_BASE_VAR} is not a usable URL: {err}"),
                Some(API_BASE_VAR.to_string()),
            )
        })?;

        let default_model = match lookup(DEFAULT_MODEL_VAR).filter(|m| !m.trim().is_empty()) {
            Some(name) => parse_startup_model(&name, DEFAULT_MODEL_VAR)?,
            None => Model::default(),
        };

        Ok(Self {
            api_key,
            api_base,
            default_model,
        })
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

fn parse_startup_model(name: &str, source: &str) -> Result<Model> {
    let model: Model = name.parse()?;
    match &model {
        Model::Known(_) => Ok(model),
        Model::Custom(custom) if custom.starts_with("deepseek-") => {
            tracing::warn!(model = %custom, "starting with a model that is not on the known list");
            Ok(model)
        }
        Model::Custom(custom) => Err(Error::config(
            format!("unsupported model: {custom}"),
            Some(source.to_string()),
        )),
    }
}

/// Command-line arguments for the chatting tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to start with, overriding DEFAULT_MODEL.
    #[arrrg(optional, "Model to use (default: $DEFAULT_MODEL or deepseek-chat)", "MODEL")]
    pub model: Option<String>,

    /// System prompt sent ahead of the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Maximum user/assistant pairs sent as context.
    #[arrrg(optional, "Max user/assistant pairs sent as context (default: all)", "PAIRS")]
    pub max_context_turns: Option<usize>,

    /// Maximum characters of history sent as context.
    #[arrrg(optional, "Max characters of history sent as context (default: all)", "CHARS")]
    pub max_context_chars: Option<usize>,

    /// Pause after each displayed chunk, in milliseconds.
    #[arrrg(optional, "Pause after each streamed chunk in ms (default: 0)", "MS")]
    pub typing_delay_ms: Option<u64>,

    /// Directory timestamped transcripts are saved into.
    #[arrrg(optional, "Directory for saved transcripts (default: current directory)", "DIR")]
    pub save_dir: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model a session starts with.
    pub model: Model,

    /// System prompt sent as the first message, if any.
    pub system_prompt: Option<String>,

    /// Bounds on the history sent with each request.
    pub context_policy: ContextPolicy,

    /// Pause after each displayed chunk.
    pub typing_delay: Duration,

    /// Directory timestamped transcripts are saved into.
    pub save_dir: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: deepseek-chat
    /// - System prompt: a short helpful-assistant prompt
    /// - Context: full history
    /// - Typing delay: none
    /// - Save directory: current directory
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: Model::Known(KnownModel::DeepseekChat),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            context_policy: ContextPolicy::unlimited(),
            typing_delay: Duration::ZERO,
            save_dir: PathBuf::from("."),
            use_color: true,
        }
    }

    /// Resolves flags on top of the environment's settings.
    ///
    /// Fails with a `Config` error when `--model` names an unsupported model.
    pub fn from_args(args: ChatArgs, session: &SessionConfig) -> Result<Self> {
        let model = match &args.model {
            Some(name) => parse_startup_model(name, "--model")?,
            None => session.default_model.clone(),
        };
        let mut config = ChatConfig::new()
            .with_model(model)
            .with_context_policy(
                ContextPolicy::unlimited()
                    .with_max_turns(args.max_context_turns)
                    .with_max_chars(args.max_context_chars),
            )
            .with_typing_delay(Duration::from_millis(args.typing_delay_ms.unwrap_or(0)));
        if let Some(system) = args.system {
            config = config.with_system_prompt(system);
        }
        if let Some(dir) = args.save_dir {
            config = config.with_save_dir(dir);
        }
        if args.no_color {
            config = config.without_color();
        }
        Ok(config)
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system prompt.  An empty prompt disables it.
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = if prompt.trim().is_empty() {
            None
        } else {
            Some(prompt)
        };
        self
    }

    /// Sets the context policy.
    pub fn with_context_policy(mut self, policy: ContextPolicy) -> Self {
        self.context_policy = policy;
        self
    }

    /// Sets the pause after each displayed chunk.
    pub fn with_typing_delay(mut self, delay: Duration) -> Self {
        self.typing_delay = delay;
        self
    }

    /// Sets the directory timestamped transcripts are saved into.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let err = SessionConfig::from_lookup(env(&[])).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains(API_KEY_VAR));

        let err = SessionConfig::from_lookup(env(&[(API_KEY_VAR, "   ")])).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn defaults_from_minimal_env() {
        let config = SessionConfig::from_lookup(env(&[(API_KEY_VAR, "sk-test")])).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.default_model, Model::Known(KnownModel::DeepseekChat));
        assert!(!format!("{config:?}").contains("sk-test"));
    }

    #[test]
    fn env_overrides() {
        let config = SessionConfig::from_lookup(env(&[
            (API_KEY_VAR, "sk-test"),
            (API_BASE_VAR, "http://localhost:8080/v1"),
            (DEFAULT_MODEL_VAR, "deepseek-reasoner"),
        ]))
        .unwrap();
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(
            config.default_model,
            Model::Known(KnownModel::DeepseekReasoner)
        );
    }

    #[test]
    fn bad_base_and_model_rejected() {
        let err = SessionConfig::from_lookup(env(&[
            (API_KEY_VAR, "sk-test"),
            (API_BASE_VAR, "not a url"),
        ]))
        .unwrap_err();
        assert!(err.is_config());

        let err = SessionConfig::from_lookup(env(&[
            (API_KEY_VAR, "sk-test"),
            (DEFAULT_MODEL_VAR, "gpt-4o"),
        ]))
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.model, Model::Known(KnownModel::DeepseekChat));
        assert_eq!(config.system_prompt.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
        assert!(config.context_policy.is_unlimited());
        assert_eq!(config.typing_delay, Duration::ZERO);
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args() {
        let session = SessionConfig::from_lookup(env(&[
            (API_KEY_VAR, "sk-test"),
            (DEFAULT_MODEL_VAR, "deepseek-reasoner"),
        ]))
        .unwrap();

        let config = ChatConfig::from_args(ChatArgs::default(), &session).unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::DeepseekReasoner));

        let args = ChatArgs {
            model: Some("deepseek-chat".to_string()),
            system: Some("Answer tersely.".to_string()),
            max_context_turns: Some(4),
            max_context_chars: None,
            typing_delay_ms: Some(15),
            save_dir: Some("/tmp/chats".to_string()),
            no_color: true,
        };
        let config = ChatConfig::from_args(args, &session).unwrap();
        assert_eq!(config.model, Model::Known(KnownModel::DeepseekChat));
        assert_eq!(config.system_prompt.as_deref(), Some("Answer tersely."));
        assert_eq!(config.context_policy.max_turns, Some(4));
        assert_eq!(config.typing_delay, Duration::from_millis(15));
        assert_eq!(config.save_dir, PathBuf::from("/tmp/chats"));
        assert!(!config.use_color);

        let args = ChatArgs {
            model: Some("llama-3".to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::from_args(args, &session).unwrap_err().is_config());
    }

    #[test]
    fn empty_system_prompt_disables_it() {
        let config = ChatConfig::new().with_system_prompt(String::new());
        assert!(config.system_prompt.is_none());
    }
}
