//! Chat session facade.
//!
//! Bundles the input box text with a [`ChatController`] so a front end only
//! talks to one object.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::controller::{ChatController, ChatOptions, ChatSnapshot, TurnOutcome};
use crate::transport::ChatTransport;
use crate::types::{Message, RequestError, Status};

/// A chat conversation plus the pending input text.
#[derive(Clone)]
pub struct ChatSession {
    controller: ChatController,
    input: Arc<Mutex<String>>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, options: ChatOptions) -> Self {
        Self {
            controller: ChatController::new(transport, options),
            input: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Current input text.
    #[must_use]
    pub fn input(&self) -> String {
        self.input.lock().clone()
    }

    /// Record the latest value of the input box.
    pub fn handle_input_change(&self, value: impl Into<String>) {
        *self.input.lock() = value.into();
    }

    pub fn set_input(&self, value: impl Into<String>) {
        self.handle_input_change(value);
    }

    /// Submit the current input.
    ///
    /// The input is cleared once the turn ends, whatever the outcome. A
    /// skipped submit (blank input or a turn already loading) leaves it alone.
    pub async fn handle_submit(&self) -> TurnOutcome {
        let text = self.input();
        let outcome = self.controller.submit(&text).await;

        if outcome != TurnOutcome::Skipped {
            self.input.lock().clear();
        }

        outcome
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub async fn reload(&self) -> TurnOutcome {
        self.controller.reload().await
    }

    pub fn set_messages(&self, messages: Vec<Message>) {
        self.controller.set_messages(messages);
    }

    pub fn update_messages<F>(&self, f: F)
    where
        F: FnOnce(&[Message]) -> Vec<Message>,
    {
        self.controller.update_messages(f);
    }

    /// Empty the conversation and reset any error.
    pub fn clear(&self) {
        self.controller.clear();
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.controller.messages()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.controller.status()
    }

    #[must_use]
    pub fn error(&self) -> Option<RequestError> {
        self.controller.error()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status() == Status::Loading
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.controller.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.controller.subscribe()
    }

    #[must_use]
    pub fn options(&self) -> ChatOptions {
        self.controller.options()
    }

    pub fn set_options(&self, options: ChatOptions) {
        self.controller.set_options(options);
    }

    /// Underlying controller.
    #[must_use]
    pub const fn controller(&self) -> &ChatController {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChatError, Result};
    use crate::transport::{ByteStream, ChatRequest};
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Answers every request with the same frames.
    struct EchoTransport {
        frames: Vec<String>,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl ChatTransport for EchoTransport {
        async fn send(&self, _request: ChatRequest) -> Result<ByteStream> {
            if let Some(status) = self.fail_with {
                return Err(ChatError::from_status(status, r#"{"error":"Invalid model"}"#));
            }

            let chunks: Vec<Result<Bytes>> = self
                .frames
                .iter()
                .map(|f| Ok(Bytes::from(format!("data: {f}\n"))))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn session(frames: &[&str]) -> ChatSession {
        let transport = EchoTransport {
            frames: frames.iter().map(ToString::to_string).collect(),
            fail_with: None,
        };
        ChatSession::new(Arc::new(transport), ChatOptions::default())
    }

    #[tokio::test]
    async fn submit_uses_and_clears_input() {
        let chat = session(&[r#"{"choices":[{"delta":{"content":"Hi there"}}]}"#]);
        chat.handle_input_change("hello");

        assert_eq!(chat.handle_submit().await, TurnOutcome::Completed);
        assert_eq!(chat.input(), "");

        let messages = chat.messages();
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "Hi there");
        assert!(!chat.is_loading());
    }

    #[tokio::test]
    async fn blank_submit_keeps_input() {
        let chat = session(&[]);
        chat.set_input("   ");

        assert_eq!(chat.handle_submit().await, TurnOutcome::Skipped);
        assert_eq!(chat.input(), "   ");
        assert!(chat.messages().is_empty());
    }

    #[tokio::test]
    async fn failed_submit_exposes_error_and_clear_resets_it() {
        let transport = EchoTransport {
            frames: Vec::new(),
            fail_with: Some(400),
        };
        let chat = ChatSession::new(Arc::new(transport), ChatOptions::default());
        chat.set_input("hello");

        assert!(matches!(chat.handle_submit().await, TurnOutcome::Failed(_)));
        assert_eq!(chat.status(), Status::Error);
        assert_eq!(chat.error().unwrap().message, "Invalid model");

        chat.clear();
        assert_eq!(chat.status(), Status::Idle);
        assert!(chat.error().is_none());
        assert!(chat.messages().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_final_snapshot() {
        let chat = session(&[r#"{"choices":[{"delta":{"content":"ok"}}]}"#]);
        let mut updates = chat.subscribe();
        assert!(!updates.has_changed().unwrap());

        chat.set_input("go");
        chat.handle_submit().await;

        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest, chat.snapshot());
        assert_eq!(latest.status, Status::Idle);
        assert_eq!(latest.messages.len(), 2);
    }
}
