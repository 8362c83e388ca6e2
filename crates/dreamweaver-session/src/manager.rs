use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dreamweaver_completion::prompts::{CompanionContext, IMAGE_ONLY_TURN, companion_system_prompt, summary_request};
use dreamweaver_completion::{
    ChatTurn, CompletionError, CompletionRequest, CompletionService, LanguageCode, LanguageDetector,
};
use dreamweaver_types::events::ChatListEvent;
use dreamweaver_types::models::{Chat, ChatSummary, Message, Sender};

use crate::error::SessionError;
use crate::events::ChatEvents;
use crate::policy::{self, ActiveChat, HISTORY_WINDOW, dangling_user_turn, derive_title, history_window, summary_due};
use crate::store::ChatStore;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Prior messages sent with each turn.
    pub history_window: usize,
    /// Upper bound for one completion call, retries included.
    pub completion_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: HISTORY_WINDOW,
            completion_timeout: Duration::from_secs(120),
        }
    }
}

/// One user turn as submitted by a client.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: Option<String>,
    /// Opaque image reference.
    pub attachment: Option<String>,
    /// Target chat; `None` starts a new one.
    pub chat_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub assistant_text: String,
    pub chat_id: Uuid,
    /// Set when this turn gave the chat its title.
    pub title: Option<String>,
}

pub struct SessionManager {
    store: Arc<dyn ChatStore>,
    completion: Arc<dyn CompletionService>,
    language: Option<Arc<LanguageDetector>>,
    events: ChatEvents,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ChatStore>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            store,
            completion,
            language: None,
            events: ChatEvents::new(),
            config: SessionConfig::default(),
        }
    }

    /// Reply in the language each turn is written in instead of English.
    pub fn with_language_detector(mut self, detector: Arc<LanguageDetector>) -> Self {
        self.language = Some(detector);
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(&self) -> &ChatEvents {
        &self.events
    }

    /// Runs a store operation on the blocking pool.
    async fn storage<T, F>(&self, op: F) -> Result<T, SessionError>
    where
        F: FnOnce(&dyn ChatStore) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || op(store.as_ref())).await {
            Ok(result) => result.map_err(SessionError::Storage),
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                Err(SessionError::Storage(anyhow!("storage task failed")))
            }
        }
    }

    pub async fn list_chats(&self, user_id: Uuid) -> Result<Vec<ChatSummary>, SessionError> {
        self.storage(move |s| s.list_chats(user_id)).await
    }

    pub async fn get_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<Chat, SessionError> {
        self.storage(move |s| s.get_chat(user_id, chat_id))
            .await?
            .ok_or(SessionError::NotFound)
    }

    pub async fn create_chat(&self, user_id: Uuid) -> Result<ChatSummary, SessionError> {
        let chat = Chat::new(user_id);
        let row = chat.clone();
        self.storage(move |s| s.save_chat(&row)).await?;

        info!("Created chat {} for user {}", chat.id, user_id);
        self.events.publish(ChatListEvent::Created {
            user_id,
            chat_id: chat.id,
            title: chat.title.clone(),
        });
        Ok(chat.to_summary())
    }

    pub async fn delete_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<(), SessionError> {
        if !self.storage(move |s| s.delete_chat(user_id, chat_id)).await? {
            return Err(SessionError::NotFound);
        }

        info!("Deleted chat {} of user {}", chat_id, user_id);
        self.events.publish(ChatListEvent::Deleted { user_id, chat_id });
        Ok(())
    }

    /// The chat a freshly loaded client should show. Creates one only when
    /// the user has none, so repeated calls settle on the same chat.
    pub async fn resolve_active_chat(
        &self,
        user_id: Uuid,
        stored_pointer: Option<String>,
    ) -> Result<ChatSummary, SessionError> {
        let chats = self.list_chats(user_id).await?;
        match policy::resolve_active_chat(stored_pointer.as_deref(), &chats) {
            ActiveChat::Existing(id) => chats
                .into_iter()
                .find(|c| c.id == id)
                .ok_or(SessionError::NotFound),
            ActiveChat::CreateNew => self.create_chat(user_id).await,
        }
    }

    /// Appends the user's turn, asks the completion service for a reply,
    /// and appends that reply.
    ///
    /// The user message is stored before the completion call. If `cancel`
    /// fires first, the message is retracted again (and a chat created by
    /// this call removed), leaving storage as it was.
    pub async fn submit_turn(
        &self,
        user_id: Uuid,
        input: TurnInput,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, SessionError> {
        let text = input.text.as_deref().map(str::trim).unwrap_or_default().to_string();
        let attachment = input.attachment.filter(|a| !a.trim().is_empty());
        if text.is_empty() && attachment.is_none() {
            return Err(SessionError::Validation("Message text or image required".into()));
        }
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let existing = match input.chat_id {
            Some(chat_id) => self.storage(move |s| s.get_chat(user_id, chat_id)).await?,
            None => None,
        };
        let (mut chat, created) = match existing {
            Some(chat) => (chat, false),
            None => {
                let chat = Chat::new(user_id);
                let row = chat.clone();
                self.storage(move |s| s.save_chat(&row)).await?;
                debug!("Turn opened chat {} for user {}", chat.id, user_id);
                (chat, true)
            }
        };
        let chat_id = chat.id;

        let reused = dangling_user_turn(&chat.messages, &text, attachment.as_deref()).map(|m| m.id);
        let prior_len = chat.messages.len() - usize::from(reused.is_some());
        let prior = &chat.messages[..prior_len];
        let history = history_window(prior, self.config.history_window);
        let first_user_turn = !prior.iter().any(|m| m.sender == Sender::User);

        let appended = match reused {
            Some(message_id) => {
                debug!("Retrying unanswered message {} in chat {}", message_id, chat_id);
                None
            }
            None => {
                let message = Message::new(Sender::User, text.clone(), attachment.clone());
                let row = message.clone();
                if !self.storage(move |s| s.append_message(user_id, chat_id, &row)).await? {
                    return Err(SessionError::NotFound);
                }
                let message_id = message.id;
                chat.messages.push(message);
                Some(message_id)
            }
        };

        let reply = match self.ask_companion(&chat, &text, attachment.is_some(), history, cancel).await {
            Ok(reply) => reply,
            Err(CompletionError::Cancelled) => {
                self.roll_back(user_id, chat_id, created, appended).await?;
                info!("Turn on chat {} cancelled", chat_id);
                return Err(SessionError::Cancelled);
            }
            Err(e) => {
                warn!("Turn on chat {} failed: {}", chat_id, e);
                if created {
                    self.events.publish(ChatListEvent::Created {
                        user_id,
                        chat_id,
                        title: chat.title.clone(),
                    });
                }
                return Err(SessionError::from_completion(chat_id, e));
            }
        };

        let assistant = Message::new(Sender::Assistant, reply.clone(), None);
        let row = assistant.clone();
        if !self.storage(move |s| s.append_message(user_id, chat_id, &row)).await? {
            warn!("Chat {} was deleted while its turn was in flight", chat_id);
        }
        chat.messages.push(assistant);

        // A reused message never got its summary check: the attempt that
        // stored it failed before reaching this point.
        let refresh = summary_due(prior_len + 1) || summary_due(prior_len + 2);
        let title = first_user_turn.then(|| derive_title(&text));
        if let Some(title) = &title {
            chat.title = title.clone();
        }
        if refresh {
            if let Some(summary) = self.summarize(&chat.messages, cancel).await {
                chat.summary = Some(summary);
            }
        }
        if title.is_some() || refresh {
            chat.updated_at = Utc::now();
            let row = chat.clone();
            self.storage(move |s| s.update_chat(&row)).await?;
        }

        let event = if created {
            ChatListEvent::Created { user_id, chat_id, title: chat.title.clone() }
        } else {
            ChatListEvent::Updated { user_id, chat_id, title: title.clone() }
        };
        self.events.publish(event);

        Ok(TurnOutcome {
            assistant_text: reply,
            chat_id,
            title,
        })
    }

    /// Replaces the most recent user message reading `original_text` with a
    /// new turn. Only that one message is removed; the reply that followed
    /// it stays in the log. A cancelled edit puts the message back.
    pub async fn edit_turn(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        original_text: &str,
        new_text: String,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, SessionError> {
        if new_text.trim().is_empty() {
            return Err(SessionError::Validation("Edited message cannot be empty".into()));
        }
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let original = original_text.trim().to_string();
        let mut taken = None;
        if let Some(chat) = self.storage(move |s| s.get_chat(user_id, chat_id)).await? {
            let target = chat
                .messages
                .iter()
                .rev()
                .find(|m| m.sender == Sender::User && m.content == original)
                .map(|m| m.id);

            match target {
                Some(message_id) => {
                    taken = self.storage(move |s| s.take_message(user_id, chat_id, message_id)).await?;
                    if taken.is_none() {
                        debug!("Message {} was already retracted", message_id);
                    }
                }
                None => debug!("No message to replace in chat {}", chat_id),
            }
        }

        let input = TurnInput {
            text: Some(new_text),
            attachment: None,
            chat_id: Some(chat_id),
        };
        match self.submit_turn(user_id, input, cancel).await {
            Err(SessionError::Cancelled) => {
                if let Some(taken) = taken {
                    let message_id = taken.message.id;
                    if !self.storage(move |s| s.restore_message(user_id, chat_id, &taken)).await? {
                        warn!("Chat {} is gone, message {} not restored", chat_id, message_id);
                    }
                }
                Err(SessionError::Cancelled)
            }
            other => other,
        }
    }

    async fn ask_companion(
        &self,
        chat: &Chat,
        text: &str,
        has_image: bool,
        history: Vec<ChatTurn>,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let language = match &self.language {
            Some(detector) if !text.is_empty() => detector.detect(text, cancel).await,
            _ => LanguageCode::English,
        };

        let system_prompt = companion_system_prompt(&CompanionContext {
            summary: chat.summary.as_deref(),
            language,
            has_image,
            now: Utc::now(),
        });
        let new_turn = if text.is_empty() { IMAGE_ONLY_TURN } else { text };
        let request = CompletionRequest::new(system_prompt, history, new_turn);

        match timeout(self.config.completion_timeout, self.completion.complete(request, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Transient(format!(
                "no reply within {:?}",
                self.config.completion_timeout
            ))),
        }
    }

    /// A fresh rolling summary, or `None` to keep the previous one.
    async fn summarize(&self, messages: &[Message], cancel: &CancellationToken) -> Option<String> {
        let request = summary_request(messages);
        match timeout(self.config.completion_timeout, self.completion.complete(request, cancel)).await {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                warn!("Summary refresh failed, keeping previous summary: {}", e);
                None
            }
            Err(_) => {
                warn!("Summary refresh timed out, keeping previous summary");
                None
            }
        }
    }

    async fn roll_back(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        created: bool,
        appended: Option<Uuid>,
    ) -> Result<(), SessionError> {
        if created {
            self.storage(move |s| s.delete_chat(user_id, chat_id)).await?;
        } else if let Some(message_id) = appended {
            self.storage(move |s| s.retract_message(user_id, chat_id, message_id)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamweaver_completion::mock::MockCompletion;
    use dreamweaver_completion::prompts::SUMMARY_PROMPT;
    use dreamweaver_db::Database;

    struct Harness {
        manager: Arc<SessionManager>,
        mock: Arc<MockCompletion>,
        db: Arc<Database>,
        user: Uuid,
    }

    fn add_user(db: &Database, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), "Test", email, "hash", "2026-01-01T00:00:00.000Z")
            .unwrap();
        id
    }

    fn harness() -> Harness {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mock = Arc::new(MockCompletion::new());
        let user = add_user(&db, "asha@example.com");
        let manager = Arc::new(SessionManager::new(db.clone(), mock.clone()));
        Harness { manager, mock, db, user }
    }

    fn turn(text: &str, chat_id: Option<Uuid>) -> TurnInput {
        TurnInput {
            text: Some(text.to_string()),
            attachment: None,
            chat_id,
        }
    }

    fn contents(chat: &Chat) -> Vec<(Sender, String)> {
        chat.messages.iter().map(|m| (m.sender, m.content.clone())).collect()
    }

    #[tokio::test]
    async fn first_turn_creates_and_titles_chat() {
        let h = harness();
        let mut events = h.manager.events().subscribe();

        let outcome = h
            .manager
            .submit_turn(h.user, turn("I feel really anxious about tomorrow", None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.assistant_text, "reply 1");
        assert_eq!(outcome.title.as_deref(), Some("I feel really anxious about..."));

        let chat = h.manager.get_chat(h.user, outcome.chat_id).await.unwrap();
        assert_eq!(
            contents(&chat),
            vec![
                (Sender::User, "I feel really anxious about tomorrow".to_string()),
                (Sender::Assistant, "reply 1".to_string()),
            ]
        );
        assert_eq!(chat.title, "I feel really anxious about...");
        assert!(chat.summary.is_none());

        let request = &h.mock.turn_requests()[0];
        assert!(request.history.is_empty());
        assert!(request.system_prompt.contains("Conversation Context: New conversation"));

        assert_eq!(
            events.try_recv().unwrap(),
            ChatListEvent::Created {
                user_id: h.user,
                chat_id: outcome.chat_id,
                title: chat.title.clone(),
            }
        );
    }

    #[tokio::test]
    async fn later_turns_keep_title_and_send_bounded_history() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("first", None), &cancel).await.unwrap();
        let chat_id = Some(first.chat_id);

        for text in ["second", "third", "fourth", "fifth"] {
            let outcome = h.manager.submit_turn(h.user, turn(text, chat_id), &cancel).await.unwrap();
            assert_eq!(outcome.title, None);
        }

        let requests = h.mock.turn_requests();
        let last = requests.last().unwrap();
        let history: Vec<&str> = last.history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(history, vec!["second", "reply 2", "third", "reply 3", "fourth", "reply 4"]);
        assert_eq!(last.new_turn, "fifth");

        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(chat.messages.len(), 10);
        assert_eq!(chat.title, "first");
    }

    #[tokio::test]
    async fn summary_refreshes_when_count_hits_multiple_of_three() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("one", None), &cancel).await.unwrap();
        assert_eq!(h.mock.summary_requests(), 0);

        // user append brings the log to 3 messages
        h.manager.submit_turn(h.user, turn("two", Some(first.chat_id)), &cancel).await.unwrap();
        assert_eq!(h.mock.summary_requests(), 1);
        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(chat.summary.as_deref(), Some("summary of 4 messages"));

        // assistant append brings it to 6
        h.manager.submit_turn(h.user, turn("three", Some(first.chat_id)), &cancel).await.unwrap();
        assert_eq!(h.mock.summary_requests(), 2);

        let next = h.manager.submit_turn(h.user, turn("four", Some(first.chat_id)), &cancel).await;
        assert!(next.is_ok());
        let last = h.mock.turn_requests().pop().unwrap();
        assert!(last.system_prompt.contains("Conversation Context: summary of 6 messages"));
    }

    #[tokio::test]
    async fn failed_summary_keeps_previous_one() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("one", None), &cancel).await.unwrap();
        h.manager.submit_turn(h.user, turn("two", Some(first.chat_id)), &cancel).await.unwrap();

        h.mock.set_summary(Err(CompletionError::Transient("overloaded".into())));
        let outcome = h
            .manager
            .submit_turn(h.user, turn("three", Some(first.chat_id)), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.assistant_text, "reply 3");
        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(chat.summary.as_deref(), Some("summary of 4 messages"));
        assert_eq!(chat.messages.len(), 6);
    }

    #[tokio::test]
    async fn blank_turn_is_rejected_without_side_effects() {
        let h = harness();
        let input = TurnInput {
            text: Some("   ".into()),
            attachment: Some(String::new()),
            chat_id: None,
        };

        let error = h.manager.submit_turn(h.user, input, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(error, SessionError::Validation(_)));
        assert!(h.manager.list_chats(h.user).await.unwrap().is_empty());
        assert!(h.mock.requests().is_empty());
    }

    #[tokio::test]
    async fn image_only_turn_uses_image_title_and_prompt() {
        let h = harness();
        let input = TurnInput {
            text: None,
            attachment: Some("/uploads/sunset.png".into()),
            chat_id: None,
        };

        let outcome = h.manager.submit_turn(h.user, input, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.title.as_deref(), Some("Shared an image"));
        let request = &h.mock.turn_requests()[0];
        assert_eq!(request.new_turn, IMAGE_ONLY_TURN);
        assert!(request.system_prompt.contains("The user has shared an image."));

        let chat = h.manager.get_chat(h.user, outcome.chat_id).await.unwrap();
        assert_eq!(chat.messages[0].image.as_deref(), Some("/uploads/sunset.png"));
    }

    #[tokio::test]
    async fn unknown_or_foreign_chat_starts_a_new_one() {
        let h = harness();
        let cancel = CancellationToken::new();
        let other = add_user(&h.db, "ravi@example.com");
        let foreign = h.manager.submit_turn(other, turn("mine", None), &cancel).await.unwrap();

        let outcome = h
            .manager
            .submit_turn(h.user, turn("hello", Some(foreign.chat_id)), &cancel)
            .await
            .unwrap();
        assert_ne!(outcome.chat_id, foreign.chat_id);

        let unknown = h
            .manager
            .submit_turn(h.user, turn("hello again", Some(Uuid::new_v4())), &cancel)
            .await
            .unwrap();
        assert_ne!(unknown.chat_id, outcome.chat_id);

        let untouched = h.manager.get_chat(other, foreign.chat_id).await.unwrap();
        assert_eq!(untouched.messages.len(), 2);
        assert!(matches!(
            h.manager.get_chat(h.user, foreign.chat_id).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn cancellation_retracts_the_appended_turn() {
        let h = harness();
        let first = h
            .manager
            .submit_turn(h.user, turn("hello", None), &CancellationToken::new())
            .await
            .unwrap();
        let before = h.manager.get_chat(h.user, first.chat_id).await.unwrap();

        h.mock.hold_turns(true);
        let cancel = CancellationToken::new();
        let task = {
            let manager = h.manager.clone();
            let cancel = cancel.clone();
            let user = h.user;
            let chat_id = first.chat_id;
            tokio::spawn(async move { manager.submit_turn(user, turn("never mind", Some(chat_id)), &cancel).await })
        };

        h.mock.turn_started().await;
        let during = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(during.messages.len(), 3);

        cancel.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(SessionError::Cancelled)));

        let after = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(contents(&after), contents(&before));
    }

    #[tokio::test]
    async fn cancelling_a_first_turn_removes_the_new_chat() {
        let h = harness();
        h.mock.hold_turns(true);
        let cancel = CancellationToken::new();
        let task = {
            let manager = h.manager.clone();
            let cancel = cancel.clone();
            let user = h.user;
            tokio::spawn(async move { manager.submit_turn(user, turn("hi", None), &cancel).await })
        };

        h.mock.turn_started().await;
        assert_eq!(h.manager.list_chats(h.user).await.unwrap().len(), 1);
        cancel.cancel();

        assert!(matches!(task.await.unwrap(), Err(SessionError::Cancelled)));
        assert!(h.manager.list_chats(h.user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_keeps_user_turn_and_retry_reuses_it() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("hello", None), &cancel).await.unwrap();

        h.mock.push_reply(Err(CompletionError::Transient("HTTP 503".into())));
        let error = h
            .manager
            .submit_turn(h.user, turn("are you there?", Some(first.chat_id)), &cancel)
            .await
            .unwrap_err();
        match error {
            SessionError::UpstreamTransient { chat_id, .. } => assert_eq!(chat_id, first.chat_id),
            other => panic!("unexpected error: {other:?}"),
        }

        let failed = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(failed.messages.len(), 3);
        assert_eq!(failed.messages[2].content, "are you there?");

        h.manager
            .submit_turn(h.user, turn("are you there?", Some(first.chat_id)), &cancel)
            .await
            .unwrap();
        let retried = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        let senders: Vec<Sender> = retried.messages.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::User, Sender::Assistant, Sender::User, Sender::Assistant]);
        assert!(retried.messages.iter().all(|m| !m.content.contains("503")));
    }

    #[tokio::test]
    async fn permanent_failure_is_reported_as_such() {
        let h = harness();
        h.mock.push_reply(Err(CompletionError::Permanent("HTTP 400".into())));

        let error = h
            .manager
            .submit_turn(h.user, turn("hello", None), &CancellationToken::new())
            .await
            .unwrap_err();

        let SessionError::UpstreamPermanent { chat_id, .. } = error else {
            panic!("expected permanent failure");
        };
        let chat = h.manager.get_chat(h.user, chat_id).await.unwrap();
        assert_eq!(chat.messages.len(), 1);
    }

    #[tokio::test]
    async fn edit_replaces_only_the_latest_matching_message() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("same", None), &cancel).await.unwrap();
        h.manager.submit_turn(h.user, turn("same", Some(first.chat_id)), &cancel).await.unwrap();

        h.manager
            .edit_turn(h.user, first.chat_id, "same", "different".into(), &cancel)
            .await
            .unwrap();

        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(
            contents(&chat),
            vec![
                (Sender::User, "same".to_string()),
                (Sender::Assistant, "reply 1".to_string()),
                (Sender::Assistant, "reply 2".to_string()),
                (Sender::User, "different".to_string()),
                (Sender::Assistant, "reply 3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_edit_does_not_retract_twice() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("original", None), &cancel).await.unwrap();

        h.manager
            .edit_turn(h.user, first.chat_id, "original", "edited".into(), &cancel)
            .await
            .unwrap();
        h.manager
            .edit_turn(h.user, first.chat_id, "original", "edited again".into(), &cancel)
            .await
            .unwrap();

        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        let user_turns: Vec<String> = chat
            .messages
            .iter()
            .filter(|m| m.sender == Sender::User)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(user_turns, vec!["edited", "edited again"]);
        assert_eq!(chat.messages.len(), 5);
    }

    #[tokio::test]
    async fn cancelled_edit_restores_original() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("old text", None), &cancel).await.unwrap();
        let before = h.manager.get_chat(h.user, first.chat_id).await.unwrap();

        h.mock.hold_turns(true);
        let edit_cancel = CancellationToken::new();
        let task = {
            let manager = h.manager.clone();
            let (user, chat_id, token) = (h.user, first.chat_id, edit_cancel.clone());
            tokio::spawn(async move {
                manager
                    .edit_turn(user, chat_id, "old text", "new text".into(), &token)
                    .await
            })
        };
        h.mock.turn_started().await;
        edit_cancel.cancel();

        assert!(matches!(task.await.unwrap(), Err(SessionError::Cancelled)));
        let after = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(after.messages, before.messages);
        assert_eq!(contents(&after)[0], (Sender::User, "old text".to_string()));
    }

    #[tokio::test]
    async fn retried_turn_runs_the_summary_its_failed_attempt_missed() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("hello", None), &cancel).await.unwrap();

        // The third message is stored by a failed attempt.
        h.mock.push_reply(Err(CompletionError::Transient("HTTP 503".into())));
        h.manager
            .submit_turn(h.user, turn("still here", Some(first.chat_id)), &cancel)
            .await
            .unwrap_err();
        assert_eq!(h.mock.summary_requests(), 0);

        h.manager
            .submit_turn(h.user, turn("still here", Some(first.chat_id)), &cancel)
            .await
            .unwrap();

        assert_eq!(h.mock.summary_requests(), 1);
        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(chat.messages.len(), 4);
        assert_eq!(chat.summary.as_deref(), Some("summary of 4 messages"));
    }

    #[tokio::test]
    async fn resolve_active_chat_creates_at_most_once() {
        let h = harness();
        let mut events = h.manager.events().subscribe();

        let a = h.manager.resolve_active_chat(h.user, None).await.unwrap();
        let b = h.manager.resolve_active_chat(h.user, Some("not-a-uuid".into())).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(h.manager.list_chats(h.user).await.unwrap().len(), 1);
        assert!(matches!(events.try_recv().unwrap(), ChatListEvent::Created { .. }));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn resolve_active_chat_honours_pointer() {
        let h = harness();
        let older = h.manager.create_chat(h.user).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = h.manager.create_chat(h.user).await.unwrap();

        let pointed = h
            .manager
            .resolve_active_chat(h.user, Some(older.id.to_string()))
            .await
            .unwrap();
        assert_eq!(pointed.id, older.id);

        let fallback = h.manager.resolve_active_chat(h.user, None).await.unwrap();
        assert_eq!(fallback.id, newer.id);
    }

    #[tokio::test]
    async fn delete_is_scoped_and_announced() {
        let h = harness();
        let chat = h.manager.create_chat(h.user).await.unwrap();
        let other = add_user(&h.db, "ravi@example.com");
        let mut events = h.manager.events().subscribe();

        assert!(matches!(
            h.manager.delete_chat(other, chat.id).await,
            Err(SessionError::NotFound)
        ));
        h.manager.delete_chat(h.user, chat.id).await.unwrap();
        assert!(matches!(
            h.manager.delete_chat(h.user, chat.id).await,
            Err(SessionError::NotFound)
        ));

        assert_eq!(
            events.try_recv().unwrap(),
            ChatListEvent::Deleted { user_id: h.user, chat_id: chat.id }
        );
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_chat_both_survive() {
        let h = harness();
        let cancel = CancellationToken::new();
        let first = h.manager.submit_turn(h.user, turn("start", None), &cancel).await.unwrap();

        let spawn_turn = |text: &'static str| {
            let manager = h.manager.clone();
            let user = h.user;
            let chat_id = first.chat_id;
            tokio::spawn(async move {
                manager
                    .submit_turn(user, turn(text, Some(chat_id)), &CancellationToken::new())
                    .await
            })
        };
        let (a, b) = tokio::join!(spawn_turn("left"), spawn_turn("right"));
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let chat = h.manager.get_chat(h.user, first.chat_id).await.unwrap();
        assert_eq!(chat.messages.len(), 6);
        let user_turns: Vec<&str> = chat
            .messages
            .iter()
            .filter(|m| m.sender == Sender::User)
            .map(|m| m.content.as_str())
            .collect();
        assert!(user_turns.contains(&"left") && user_turns.contains(&"right"));
        // both turns may refresh the summary; whichever finished last wins
        assert!(h.mock.summary_requests() >= 1);
        assert!(chat.summary.is_some());
    }

    #[tokio::test]
    async fn language_detector_steers_the_reply_language() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = add_user(&db, "asha@example.com");
        let mock = Arc::new(MockCompletion::new());
        let detector = Arc::new(LanguageDetector::new(mock.clone(), Duration::from_secs(60)));
        let manager = SessionManager::new(db, mock.clone()).with_language_detector(detector.clone());

        manager
            .submit_turn(user, turn("hello there", None), &CancellationToken::new())
            .await
            .unwrap();

        let request = &mock.turn_requests()[0];
        assert!(request.system_prompt.contains("Speaks in en"));
        assert_eq!(detector.stats().misses, 1);
        assert!(mock.requests().iter().all(|r| r.system_prompt != SUMMARY_PROMPT));
    }
}
