//! Scripted in-process completion service for tests and local demos.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::prompts::{LANGUAGE_DETECTION_PROMPT, SUMMARY_PROMPT};
use crate::{CompletionError, CompletionRequest, CompletionService};

/// Answers companion turns from a queue (falling back to `reply N`),
/// summaries from a fixed script, and language detection with `en-IN`.
pub struct MockCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    summary: Mutex<Option<Result<String, CompletionError>>>,
    hold_turns: AtomicBool,
    turn_started: Notify,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            summary: Mutex::new(None),
            hold_turns: AtomicBool::new(false),
            turn_started: Notify::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: Result<String, CompletionError>) {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(reply);
    }

    /// Fixes the outcome of every summary request. Without a script the
    /// summary echoes the transcript line count.
    pub fn set_summary(&self, summary: Result<String, CompletionError>) {
        *self.summary.lock().unwrap_or_else(|e| e.into_inner()) = Some(summary);
    }

    /// While set, companion turns never answer and only end on cancellation.
    pub fn hold_turns(&self, hold: bool) {
        self.hold_turns.store(hold, Ordering::SeqCst);
    }

    /// Resolves once a held companion turn reached the service.
    pub async fn turn_started(&self) {
        self.turn_started.notified().await;
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn turn_requests(&self) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.system_prompt != SUMMARY_PROMPT && r.system_prompt != LANGUAGE_DETECTION_PROMPT)
            .collect()
    }

    pub fn summary_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.system_prompt == SUMMARY_PROMPT)
            .count()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        if cancel.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        let kind = request.system_prompt.clone();
        let transcript_lines = request.new_turn.lines().count();
        let turn_number = {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            requests.push(request);
            requests
                .iter()
                .filter(|r| r.system_prompt != SUMMARY_PROMPT && r.system_prompt != LANGUAGE_DETECTION_PROMPT)
                .count()
        };

        if kind == LANGUAGE_DETECTION_PROMPT {
            return Ok("en-IN".to_string());
        }

        if kind == SUMMARY_PROMPT {
            let scripted = self.summary.lock().unwrap_or_else(|e| e.into_inner()).clone();
            return scripted.unwrap_or_else(|| Ok(format!("summary of {transcript_lines} messages")));
        }

        if self.hold_turns.load(Ordering::SeqCst) {
            self.turn_started.notify_one();
            cancel.cancelled().await;
            return Err(CompletionError::Cancelled);
        }

        let scripted = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        scripted.unwrap_or_else(|| Ok(format!("reply {turn_number}")))
    }
}
