//! Choosing what history to send, and folding replies back into it.

use crate::chat::transcript::Transcript;
use crate::types::{ChatCompletionRequest, ChatMessage, KnownModel, Model, Role, Turn};
use crate::{Error, Result};

/// The system prompt used unless one is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Prefix shared by every model name the API may grow into.
const MODEL_FAMILY_PREFIX: &str = "deepseek-";

/// Bounds on how much history goes into a request.
///
/// A unit is a user turn together with the assistant reply that follows it,
/// or a lone turn that has no partner.  Units are dropped oldest first, and
/// the newest unit is always kept even if it alone exceeds a bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextPolicy {
    /// Maximum number of units.
    pub max_turns: Option<usize>,
    /// Maximum number of characters across all kept turns.
    pub max_chars: Option<usize>,
}

impl ContextPolicy {
    /// Sends the full history.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Caps the number of user/assistant units.
    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Caps the number of characters.
    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Returns true when no bound is set.
    pub fn is_unlimited(&self) -> bool {
        self.max_turns.is_none() && self.max_chars.is_none()
    }
}

/// The outcome of a successful model switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChange {
    /// The model now in use.
    pub model: Model,
    /// Set when the model was accepted without being on the known list.
    pub warning: Option<String>,
}

/// Decides which turns are sent and with which model.
#[derive(Debug, Clone)]
pub struct ContextManager {
    model: Model,
    policy: ContextPolicy,
    system_prompt: Option<String>,
}

impl ContextManager {
    /// Creates a manager sending full history with the default system prompt.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            policy: ContextPolicy::unlimited(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Sets the context policy.
    pub fn with_policy(mut self, policy: ContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets or removes the system prompt.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The context policy.
    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    /// The system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// The completed turns that should be sent, oldest first.
    pub fn build_request_context<'a>(&self, transcript: &'a Transcript) -> Vec<&'a Turn> {
        let units = units(transcript);
        let mut first = 0;
        let mut chars: usize = units.iter().map(|u| unit_chars(u)).sum();
        while units.len() - first > 1 {
            let over_turns = self
                .policy
                .max_turns
                .is_some_and(|max| units.len() - first > max);
            let over_chars = self.policy.max_chars.is_some_and(|max| chars > max);
            if !over_turns && !over_chars {
                break;
            }
            chars -= unit_chars(&units[first]);
            first += 1;
        }
        if first > 0 {
            tracing::debug!(dropped_units = first, "trimmed request context");
        }
        units.into_iter().skip(first).flatten().collect()
    }

    /// The full request: system prompt followed by the chosen context.
    pub fn build_request(&self, transcript: &Transcript) -> ChatCompletionRequest {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(
            self.build_request_context(transcript)
                .into_iter()
                .map(ChatMessage::from),
        );
        ChatCompletionRequest::new(self.model.clone(), messages)
    }

    /// Records a finished turn.
    ///
    /// If a turn with `role` is in progress it is finalized with `content`;
    /// otherwise a new complete turn is appended.  Empty assistant content is
    /// rejected and the transcript is left untouched.
    pub fn commit_completed_turn(
        &self,
        transcript: &mut Transcript,
        role: Role,
        content: &str,
    ) -> Result<()> {
        if role == Role::Assistant && content.trim().is_empty() {
            return Err(Error::invalid_state("assistant reply is empty"));
        }
        match transcript.in_progress().map(|t| t.role) {
            Some(in_progress) if in_progress == role => {
                transcript.complete_in_progress(content)?;
                Ok(())
            }
            Some(in_progress) => Err(Error::invalid_state(format!(
                "cannot commit a {role} turn while a {in_progress} turn is in progress"
            ))),
            None => transcript.append(Turn::new(role, content)),
        }
    }

    /// Changes the model used for future requests.
    ///
    /// Known models switch silently.  Other names in the DeepSeek family are
    /// accepted with a warning.  Anything else fails with `Validation` and
    /// leaves the current model in place.
    pub fn switch_model(&mut self, name: &str) -> Result<ModelChange> {
        let name = name.trim();
        if let Ok(known) = name.parse::<KnownModel>() {
            self.model = Model::Known(known);
            return Ok(ModelChange {
                model: self.model.clone(),
                warning: None,
            });
        }
        if name.len() > MODEL_FAMILY_PREFIX.len() && name.starts_with(MODEL_FAMILY_PREFIX) {
            tracing::warn!(model = name, "switching to a model that is not on the known list");
            self.model = Model::Custom(name.to_string());
            return Ok(ModelChange {
                model: self.model.clone(),
                warning: Some(format!(
                    "{name} is not a known model; requests may be rejected"
                )),
            });
        }
        let known = KnownModel::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::validation(
            format!("unsupported model: {name} (supported: {known})"),
            Some("model".to_string()),
        ))
    }
}

/// Groups completed turns into units that are never split.
fn units(transcript: &Transcript) -> Vec<Vec<&Turn>> {
    let mut units: Vec<Vec<&Turn>> = Vec::new();
    let mut completed = transcript.completed().peekable();
    while let Some(turn) = completed.next() {
        match (turn.role, completed.peek()) {
            (Role::User, Some(next)) if next.role == Role::Assistant => {
                let reply = completed.next();
                units.push(std::iter::once(turn).chain(reply).collect());
            }
            _ => units.push(vec![turn]),
        }
    }
    units
}

fn unit_chars(unit: &[&Turn]) -> usize {
    unit.iter().map(|t| t.content.chars().count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn transcript(pairs: &[(&str, &str)]) -> Transcript {
        let mut t = Transcript::new();
        for (q, a) in pairs {
            t.append(Turn::user(*q)).unwrap();
            t.append(Turn::assistant(*a)).unwrap();
        }
        t
    }

    fn contents(turns: &[&Turn]) -> Vec<String> {
        turns.iter().map(|t| t.content.clone()).collect()
    }

    #[test]
    fn full_history_by_default() {
        let t = transcript(&[("q1", "a1"), ("q2", "a2")]);
        let manager = ContextManager::new(Model::default());
        assert_eq!(
            contents(&manager.build_request_context(&t)),
            vec!["q1", "a1", "q2", "a2"]
        );
    }

    #[test]
    fn in_progress_turn_never_sent() {
        let mut t = transcript(&[("q1", "a1")]);
        t.append(Turn::user("q2")).unwrap();
        t.append(Turn::in_progress(Role::Assistant)).unwrap();
        let manager = ContextManager::new(Model::default());
        assert_eq!(
            contents(&manager.build_request_context(&t)),
            vec!["q1", "a1", "q2"]
        );
    }

    #[test]
    fn max_turns_drops_oldest_pairs() {
        let mut t = transcript(&[("q1", "a1"), ("q2", "a2"), ("q3", "a3")]);
        t.append(Turn::user("q4")).unwrap();
        let manager = ContextManager::new(Model::default())
            .with_policy(ContextPolicy::unlimited().with_max_turns(Some(2)));
        assert_eq!(
            contents(&manager.build_request_context(&t)),
            vec!["q3", "a3", "q4"]
        );
    }

    #[test]
    fn max_chars_keeps_newest_unit() {
        let t = transcript(&[("short", "reply"), ("a much longer question", "answer")]);
        let manager = ContextManager::new(Model::default())
            .with_policy(ContextPolicy::unlimited().with_max_chars(Some(5)));
        assert_eq!(
            contents(&manager.build_request_context(&t)),
            vec!["a much longer question", "answer"]
        );
    }

    #[test]
    fn request_starts_with_system_prompt() {
        let t = transcript(&[("q1", "a1")]);
        let manager = ContextManager::new(Model::default());
        let request = manager.build_request(&t);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(request.messages.len(), 3);
        assert!(request.stream);

        let manager = manager.with_system_prompt(None);
        assert_eq!(manager.build_request(&t).messages.len(), 2);
    }

    #[test]
    fn empty_assistant_commit_rejected() {
        let mut t = transcript(&[("q1", "a1")]);
        t.append(Turn::user("q2")).unwrap();
        t.append(Turn::in_progress(Role::Assistant)).unwrap();
        let before = t.clone();
        let manager = ContextManager::new(Model::default());

        let err = manager
            .commit_completed_turn(&mut t, Role::Assistant, "")
            .unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(t, before);

        manager
            .commit_completed_turn(&mut t, Role::Assistant, "a2")
            .unwrap();
        assert!(t.in_progress().is_none());
        assert_eq!(t.turn_count(), 2);
    }

    #[test]
    fn commit_appends_without_in_progress() {
        let mut t = Transcript::new();
        let manager = ContextManager::new(Model::default());
        manager.commit_completed_turn(&mut t, Role::User, "hi").unwrap();
        manager
            .commit_completed_turn(&mut t, Role::Assistant, "hello")
            .unwrap();
        assert_eq!(t.turn_count(), 1);
    }

    #[test]
    fn switch_known_family_and_unknown() {
        let mut manager = ContextManager::new(Model::default());

        let change = manager.switch_model("deepseek-reasoner").unwrap();
        assert_eq!(change.model, Model::Known(KnownModel::DeepseekReasoner));
        assert!(change.warning.is_none());

        let change = manager.switch_model("deepseek-v9").unwrap();
        assert_eq!(change.model, Model::Custom("deepseek-v9".to_string()));
        assert!(change.warning.is_some());

        let err = manager.switch_model("gpt-4o").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(manager.model(), &Model::Custom("deepseek-v9".to_string()));

        assert!(manager.switch_model("deepseek-").unwrap_err().is_validation());
    }

    proptest! {
        #[test]
        fn context_never_splits_pairs(
            lengths in proptest::collection::vec((0usize..40, 0usize..40), 1..12),
            max_turns in proptest::option::of(1usize..6),
            max_chars in proptest::option::of(0usize..200),
            trailing_user in any::<bool>(),
        ) {
            let mut t = Transcript::new();
            for (q, a) in &lengths {
                t.append(Turn::user("q".repeat(*q))).unwrap();
                t.append(Turn::assistant("a".repeat(*a))).unwrap();
            }
            if trailing_user {
                t.append(Turn::user("pending")).unwrap();
            }
            let manager = ContextManager::new(Model::default()).with_policy(
                ContextPolicy::unlimited()
                    .with_max_turns(max_turns)
                    .with_max_chars(max_chars),
            );
            let context = manager.build_request_context(&t);
            prop_assert!(!context.is_empty());

            let pairs = if trailing_user { &context[..context.len() - 1] } else { &context[..] };
            prop_assert_eq!(pairs.len() % 2, 0);
            for pair in pairs.chunks(2) {
                prop_assert_eq!(pair[0].role, Role::User);
                prop_assert_eq!(pair[1].role, Role::Assistant);
            }

            let all: Vec<&Turn> = t.completed().collect();
            prop_assert!(std::ptr::eq(*context.last().unwrap(), *all.last().unwrap()));
        }
    }
}
