//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! and drives streaming API interactions.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::StreamExt;
use tokio::time::{Duration, sleep};

use crate::chat::config::ChatConfig;
use crate::chat::context::{ContextManager, ContextPolicy, ModelChange};
use crate::chat::stream::StreamingRenderer;
use crate::chat::transcript::Transcript;
use crate::client::{ChatBackend, EventStream};
use crate::observability::{STREAM_CHUNKS, STREAM_DURATION, STREAM_INTERRUPTS, STREAM_TTFB};
use crate::render::Renderer;
use crate::types::{Model, Role, StreamEvent, Turn};
use crate::utils;
use crate::{Error, Result};

/// How often the interrupt flag is checked while waiting on the network.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// How a reply ended when no error is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The stream ran to its end marker.
    Completed,
    /// The user stopped the stream; any partial text was kept.
    Interrupted,
}

/// A chat session that manages conversation state and API interactions.
///
/// The session owns the transcript and hands the backend a request built
/// from it for every message.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    config: ChatConfig,
    context: ContextManager,
    transcript: Transcript,
    request_count: u64,
    interrupted_count: u64,
    failed_count: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The number of completed messages in the conversation.
    pub message_count: usize,
    /// The number of completed user/assistant pairs.
    pub turn_count: usize,
    /// The bounds on history sent with each request.
    pub context_policy: ContextPolicy,
    /// The system prompt, if any.
    pub system_prompt: Option<String>,
    /// Total number of API requests made.
    pub total_requests: u64,
    /// Replies stopped by the user.
    pub interrupted_responses: u64,
    /// Replies cut short by an error.
    pub failed_responses: u64,
}

enum Connect {
    Ready(Result<EventStream>),
    Interrupted,
}

enum Next {
    Event(Option<Result<StreamEvent>>),
    Interrupted,
}

enum StreamEnd {
    Done,
    Interrupted,
    Failed(Error),
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new chat session with the given backend and configuration.
    pub fn new(backend: B, config: ChatConfig) -> Self {
        let context = ContextManager::new(config.model.clone())
            .with_policy(config.context_policy)
            .with_system_prompt(config.system_prompt.clone());
        Self {
            backend,
            config,
            context,
            transcript: Transcript::new(),
            request_count: 0,
            interrupted_count: 0,
            failed_count: 0,
        }
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Adds the user message to the transcript
    /// 2. Sends a streaming request built from the transcript
    /// 3. Renders response chunks as they arrive
    /// 4. Commits the assistant reply to the transcript
    ///
    /// If the request fails before any reply text arrives, the user message
    /// is removed again.  If it fails midway, the partial reply is kept with
    /// a marker and the error is returned.  A user interrupt (reported by
    /// [`Renderer::should_interrupt`]) keeps the partial reply and returns
    /// [`ResponseOutcome::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API request or the stream fails.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<ResponseOutcome> {
        if user_input.trim().is_empty() {
            return Err(Error::validation(
                "message must not be empty",
                Some("message".to_string()),
            ));
        }

        self.transcript.append(Turn::user(user_input))?;
        let request = self.context.build_request(&self.transcript);
        if let Err(err) = self.transcript.append(Turn::in_progress(Role::Assistant)) {
            self.transcript.pop_last_if(Role::User);
            return Err(err);
        }

        self.request_count += 1;
        tracing::info!(
            model = %self.context.model(),
            context_messages = request.messages.len(),
            "sending message"
        );
        let started = Instant::now();
        let connected = {
            let pending = self.backend.stream_chat(request);
            tokio::pin!(pending);
            loop {
                if renderer.should_interrupt() {
                    break Connect::Interrupted;
                }
                tokio::select! {
                    result = &mut pending => break Connect::Ready(result),
                    _ = sleep(INTERRUPT_POLL) => {}
                }
            }
        };
        let stream = match connected {
            Connect::Ready(Ok(stream)) => stream,
            Connect::Ready(Err(err)) => {
                self.failed_count += 1;
                self.rollback();
                return Err(err);
            }
            Connect::Interrupted => {
                STREAM_INTERRUPTS.click();
                self.interrupted_count += 1;
                tracing::info!("request interrupted before the reply started");
                renderer.print_interrupted();
                self.rollback();
                return Ok(ResponseOutcome::Interrupted);
            }
        };

        let mut streaming = StreamingRenderer::new().with_typing_delay(self.config.typing_delay);
        renderer.start_response(self.context.model().as_str());
        let end = Self::pump(stream, &mut streaming, renderer, started).await;
        STREAM_DURATION.add(started.elapsed().as_secs_f64());

        match end {
            StreamEnd::Done => {
                let text = streaming.complete(renderer)?;
                if let Err(err) =
                    self.context
                        .commit_completed_turn(&mut self.transcript, Role::Assistant, &text)
                {
                    self.failed_count += 1;
                    self.rollback();
                    return Err(err);
                }
                Ok(ResponseOutcome::Completed)
            }
            StreamEnd::Interrupted => {
                STREAM_INTERRUPTS.click();
                self.interrupted_count += 1;
                tracing::info!(chunks = streaming.chunks(), "reply interrupted");
                let partial = streaming.interrupt(renderer)?;
                self.keep_partial(&partial)?;
                Ok(ResponseOutcome::Interrupted)
            }
            StreamEnd::Failed(err) => {
                self.failed_count += 1;
                tracing::warn!(error = %err, chunks = streaming.chunks(), "reply failed");
                let partial = streaming.fail(&err, renderer)?;
                self.keep_partial(&partial)?;
                Err(err)
            }
        }
    }

    /// Feeds stream events to the streaming renderer until the stream ends.
    async fn pump(
        mut stream: EventStream,
        streaming: &mut StreamingRenderer,
        renderer: &mut dyn Renderer,
        started: Instant,
    ) -> StreamEnd {
        let mut first_event = true;
        loop {
            let next = loop {
                if renderer.should_interrupt() {
                    break Next::Interrupted;
                }
                tokio::select! {
                    event = stream.next() => break Next::Event(event),
                    _ = sleep(INTERRUPT_POLL) => {}
                }
            };
            let event = match next {
                Next::Interrupted => return StreamEnd::Interrupted,
                Next::Event(None) => {
                    return StreamEnd::Failed(Error::streaming(
                        "stream ended before the completion marker",
                        None,
                    ));
                }
                Next::Event(Some(Err(err))) => return StreamEnd::Failed(err),
                Next::Event(Some(Ok(event))) => event,
            };
            if first_event {
                first_event = false;
                STREAM_TTFB.add(started.elapsed().as_secs_f64());
            }
            let pushed = match event {
                StreamEvent::Done => return StreamEnd::Done,
                StreamEvent::Reasoning(text) => streaming.push_reasoning(&text, renderer),
                StreamEvent::Text(text) => {
                    STREAM_CHUNKS.click();
                    streaming.push_chunk(&text, renderer)
                }
            };
            if let Err(err) = pushed {
                return StreamEnd::Failed(err);
            }
            let delay = streaming.typing_delay();
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    fn keep_partial(&mut self, partial: &str) -> Result<()> {
        if partial.is_empty() {
            self.rollback();
            return Ok(());
        }
        self.context
            .commit_completed_turn(&mut self.transcript, Role::Assistant, partial)
    }

    fn rollback(&mut self) {
        self.transcript.discard_in_progress();
        self.transcript.pop_last_if(Role::User);
    }

    /// Clears the conversation history.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// The conversation so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the number of completed messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.transcript.message_count()
    }

    /// Returns the number of completed user/assistant pairs.
    pub fn turn_count(&self) -> usize {
        self.transcript.turn_count()
    }

    /// Returns the current model.
    pub fn model(&self) -> &Model {
        self.context.model()
    }

    /// Changes the model used for responses.
    pub fn switch_model(&mut self, name: &str) -> Result<ModelChange> {
        self.context.switch_model(name)
    }

    /// Returns the system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.context.system_prompt()
    }

    /// Returns the active chat configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Saves the transcript to `path`, or to a timestamped file in the save
    /// directory when `path` is `None`.  Returns the path written.
    pub fn save_transcript(&self, path: Option<&Path>) -> Result<PathBuf> {
        let now = utils::time::now();
        match path {
            Some(path) => {
                self.transcript.save_to(path, self.model(), &now)?;
                Ok(path.to_path_buf())
            }
            None => self
                .transcript
                .save_to_dir(&self.config.save_dir, self.model(), &now),
        }
    }

    /// Loads a transcript from disk, replacing the current conversation.
    ///
    /// Returns the number of messages loaded.
    pub fn load_transcript(&mut self, path: &Path) -> Result<usize> {
        let transcript = Transcript::load_from(path)?;
        let count = transcript.message_count();
        self.transcript = transcript;
        Ok(count)
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.model().clone(),
            message_count: self.message_count(),
            turn_count: self.turn_count(),
            context_policy: *self.context.policy(),
            system_prompt: self.system_prompt().map(|s| s.to_string()),
            total_requests: self.request_count,
            interrupted_responses: self.interrupted_count,
            failed_responses: self.failed_count,
        }
    }
}
