//! Completion Service: the remote model that writes the companion's replies,
//! rolling summaries, and language guesses.
//!
//! Everything above this crate talks to [`CompletionService`]; the concrete
//! [`GroqClient`] speaks the OpenAI-compatible chat-completions protocol.

pub mod cache;
pub mod client;
pub mod error;
pub mod language;
pub mod mock;
pub mod prompts;
pub mod retry;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use client::{GroqClient, GroqConfig};
pub use error::CompletionError;
pub use language::{LanguageCode, LanguageDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One call to the completion service: system prompt, bounded history,
/// and the new user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<ChatTurn>,
    pub new_turn: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, history: Vec<ChatTurn>, new_turn: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history,
            new_turn: new_turn.into(),
            temperature: 0.8,
            max_tokens: 600,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate text for `request`. Must return [`CompletionError::Cancelled`]
    /// promptly once `cancel` fires.
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError>;
}
