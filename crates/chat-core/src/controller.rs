//! Request lifecycle for chat turns.
//!
//! A turn runs `idle → loading → (idle | error)`. The controller appends the
//! user message, sends the filtered history through a [`ChatTransport`], and
//! drives the response body through the frame decoder, chunk interpreter, and
//! reducer. Every turn gets a fresh cancellation token and a generation
//! number; a stopped or superseded turn never touches shared state again.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chunk;
use crate::error::Result;
use crate::reducer::{self, TurnState};
use crate::sse;
use crate::transport::{ChatRequest, ChatTransport, OutgoingMessage, ToolRef};
use crate::types::{Message, RequestError, Role, Status};

/// Default number of history entries sent with each request.
pub const DEFAULT_HISTORY_LIMIT: usize = 6;

/// Per-request settings chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    pub model: String,
    pub reasoning: bool,
    pub tools: Vec<ToolRef>,
    pub history_limit: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "claude-4-sonnet".to_string(),
            reasoning: false,
            tools: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Published view of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub status: Status,
    pub error: Option<RequestError>,
}

/// How a call to submit or reload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream ran to completion.
    Completed,
    /// `stop()` cancelled the turn, or a newer turn replaced it.
    Stopped,
    /// The request failed; the error is also recorded on the snapshot.
    Failed(RequestError),
    /// Guard rejected the call (blank input, already loading, nothing to retry).
    Skipped,
}

struct Shared {
    snapshot: ChatSnapshot,
    options: ChatOptions,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Shared {
    fn is_current(&self, generation: u64, token: &CancellationToken) -> bool {
        self.generation == generation && !token.is_cancelled()
    }
}

struct PendingTurn {
    request: ChatRequest,
    token: CancellationToken,
    generation: u64,
}

/// Owns the conversation and runs chat turns against a transport.
///
/// Cloning yields another handle to the same conversation, so `stop()` can be
/// called from a different task than the one awaiting `submit()`.
#[derive(Clone)]
pub struct ChatController {
    transport: Arc<dyn ChatTransport>,
    shared: Arc<Mutex<Shared>>,
    updates: Arc<watch::Sender<ChatSnapshot>>,
}

impl ChatController {
    pub fn new(transport: Arc<dyn ChatTransport>, options: ChatOptions) -> Self {
        let (updates, _) = watch::channel(ChatSnapshot::default());

        Self {
            transport,
            shared: Arc::new(Mutex::new(Shared {
                snapshot: ChatSnapshot::default(),
                options,
                generation: 0,
                cancel: None,
            })),
            updates: Arc::new(updates),
        }
    }

    /// Current conversation, status, and error.
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.lock().snapshot.clone()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().snapshot.messages.clone()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.shared.lock().snapshot.status
    }

    #[must_use]
    pub fn error(&self) -> Option<RequestError> {
        self.shared.lock().snapshot.error.clone()
    }

    /// Receive a snapshot after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn options(&self) -> ChatOptions {
        self.shared.lock().options.clone()
    }

    /// Replace the request options used by the next turn.
    pub fn set_options(&self, options: ChatOptions) {
        self.shared.lock().options = options;
    }

    /// Start a turn for `text`.
    ///
    /// Skipped when the text is blank or a turn is already loading.
    pub async fn submit(&self, text: &str) -> TurnOutcome {
        let pending = {
            let mut shared = self.shared.lock();
            if text.trim().is_empty() || shared.snapshot.status == Status::Loading {
                return TurnOutcome::Skipped;
            }
            self.begin_turn(&mut shared, text.to_string())
        };

        self.drive(pending).await
    }

    /// Discard the last turn and ask its question again.
    ///
    /// Removes the most recent user message and everything after it, then
    /// resubmits that message's text. Skipped while loading or when no user
    /// message exists.
    pub async fn reload(&self) -> TurnOutcome {
        let pending = {
            let mut shared = self.shared.lock();
            if shared.snapshot.status == Status::Loading {
                return TurnOutcome::Skipped;
            }

            let messages = &mut shared.snapshot.messages;
            let Some(index) = messages.iter().rposition(|m| m.role == Role::User) else {
                return TurnOutcome::Skipped;
            };

            let content = messages[index].content.clone();
            messages.truncate(index);
            tracing::info!(removed_from = index, "retrying last turn");

            self.begin_turn(&mut shared, content)
        };

        self.drive(pending).await
    }

    /// Cancel the in-flight turn, keeping whatever was already committed.
    pub fn stop(&self) {
        let mut shared = self.shared.lock();
        let Some(token) = shared.cancel.take() else {
            return;
        };

        token.cancel();
        shared.snapshot.status = Status::Idle;
        tracing::info!(generation = shared.generation, "chat turn stopped");
        self.publish(&shared);
    }

    /// Replace the message list.
    ///
    /// An empty list also clears the error and returns to idle, cancelling
    /// any turn still streaming.
    pub fn set_messages(&self, messages: Vec<Message>) {
        let mut shared = self.shared.lock();

        if messages.is_empty() {
            if let Some(token) = shared.cancel.take() {
                token.cancel();
            }
            shared.snapshot.error = None;
            shared.snapshot.status = Status::Idle;
        }

        shared.snapshot.messages = messages;
        self.publish(&shared);
    }

    /// Replace the message list with a function of the current one.
    pub fn update_messages<F>(&self, f: F)
    where
        F: FnOnce(&[Message]) -> Vec<Message>,
    {
        let current = self.messages();
        self.set_messages(f(&current));
    }

    /// Empty the conversation.
    pub fn clear(&self) {
        self.set_messages(Vec::new());
    }

    fn begin_turn(&self, shared: &mut Shared, content: String) -> PendingTurn {
        if let Some(previous) = shared.cancel.take() {
            previous.cancel();
        }

        shared.generation += 1;
        shared.snapshot.messages.push(Message::user(content));
        shared.snapshot.error = None;
        shared.snapshot.status = Status::Loading;

        let token = CancellationToken::new();
        shared.cancel = Some(token.clone());

        let request = build_request(&shared.options, &shared.snapshot.messages);
        tracing::info!(
            generation = shared.generation,
            model = %request.model,
            history = request.messages.len(),
            "chat turn started"
        );

        self.publish(shared);

        PendingTurn {
            request,
            token,
            generation: shared.generation,
        }
    }

    async fn drive(&self, pending: PendingTurn) -> TurnOutcome {
        let PendingTurn {
            request,
            token,
            generation,
        } = pending;

        let result = tokio::select! {
            biased;
            () = token.cancelled() => return TurnOutcome::Stopped,
            result = self.stream_turn(request, &token, generation) => result,
        };

        let mut shared = self.shared.lock();
        if !shared.is_current(generation, &token) {
            return TurnOutcome::Stopped;
        }
        shared.cancel = None;

        let outcome = match result {
            Ok(()) => {
                shared.snapshot.status = Status::Idle;
                tracing::info!(generation, "chat turn completed");
                TurnOutcome::Completed
            }
            Err(e) => {
                tracing::error!(generation, error = %e, "chat turn failed");
                let error = RequestError::new(e.to_string());
                shared.snapshot.status = Status::Error;
                shared.snapshot.error = Some(error.clone());
                TurnOutcome::Failed(error)
            }
        };

        self.publish(&shared);
        outcome
    }

    async fn stream_turn(
        &self,
        request: ChatRequest,
        token: &CancellationToken,
        generation: u64,
    ) -> Result<()> {
        let body = self.transport.send(request).await?;
        let frames = sse::data_frames(body);
        futures::pin_mut!(frames);

        let mut state = TurnState::new();

        while let Some(payload) = frames.next().await {
            let payload = payload?;
            let Some(delta) = chunk::interpret(&payload) else {
                continue;
            };

            let emission = state.apply(&delta);
            if emission.is_empty() {
                continue;
            }

            let mut shared = self.shared.lock();
            if !shared.is_current(generation, token) {
                tracing::debug!(generation, "dropping delta from superseded turn");
                return Ok(());
            }
            if reducer::commit(&mut shared.snapshot.messages, emission) {
                self.publish(&shared);
            }
        }

        Ok(())
    }

    fn publish(&self, shared: &Shared) {
        self.updates.send_replace(shared.snapshot.clone());
    }
}

/// Build the outgoing request from the conversation.
///
/// Only sendable entries are kept, then the most recent `history_limit` of
/// them. A limit of 0 sends the whole filtered history.
fn build_request(options: &ChatOptions, messages: &[Message]) -> ChatRequest {
    let sendable: Vec<OutgoingMessage> = messages
        .iter()
        .filter(|m| m.is_sendable())
        .map(OutgoingMessage::from)
        .collect();

    let skip = match options.history_limit {
        0 => 0,
        limit => sendable.len().saturating_sub(limit),
    };

    ChatRequest {
        messages: sendable.into_iter().skip(skip).collect(),
        model: options.model.clone(),
        reasoning: options.reasoning,
        tools: options.tools.clone(),
    }
}
