use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Represents a DeepSeek model identifier.
///
/// This can be a predefined model or a custom string value for models that
/// may be added in the future.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier (for future or private models)
    Custom(String),
}

/// Known DeepSeek models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnownModel {
    /// General-purpose chat model.
    DeepseekChat,

    /// Reasoning model that streams its chain of thought before answering.
    DeepseekReasoner,
}

impl KnownModel {
    /// Every known model, in display order.
    pub const ALL: [KnownModel; 2] = [KnownModel::DeepseekChat, KnownModel::DeepseekReasoner];

    /// The API identifier for this model.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::DeepseekChat => "deepseek-chat",
            KnownModel::DeepseekReasoner => "deepseek-reasoner",
        }
    }

    /// A short description shown by `/model`.
    pub fn description(&self) -> &'static str {
        match self {
            KnownModel::DeepseekChat => "DeepSeek Chat (general conversation)",
            KnownModel::DeepseekReasoner => "DeepSeek Reasoner (reasoning model)",
        }
    }
}

impl Model {
    /// Returns true if this is one of the known models.
    pub fn is_known(&self) -> bool {
        matches!(self, Model::Known(_))
    }

    /// The API identifier for this model.
    pub fn as_str(&self) -> &str {
        match self {
            Model::Known(known) => known.as_str(),
            Model::Custom(custom) => custom,
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::DeepseekChat)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown model: {s}"), Some("model".into())))
    }
}

impl FromStr for Model {
    type Err = Error;

    /// Parses a model name, falling back to [`Model::Custom`] for anything
    /// that is not a known model.  Fails only on an empty name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::validation(
                "model name must not be empty",
                Some("model".to_string()),
            ));
        }
        Ok(s.parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or_else(|_| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}
