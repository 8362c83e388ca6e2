use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use dreamweaver_types::api::SubmitTurnResponse;
use dreamweaver_types::events::ChatListEvent;
use dreamweaver_types::models::{
    ActiveChat, Chat, ChatSummary, DEFAULT_CHAT_TITLE, Message, Preferences, Sender, preview_of,
    resolve_active_chat,
};

use crate::error::ClientError;
use crate::local_state::{LocalState, LocalStateStore};

/// What the chat pane is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Saved(Uuid),
    /// A chat that exists only locally until its first turn succeeds.
    Draft,
}

/// One row of the chat pane. Notices are local only and never sent to
/// the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEntry {
    Message(Message),
    Notice(String),
}

/// A turn accepted by [`ClientSession::begin_turn`], ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    pub chat_id: Option<Uuid>,
    pub text: Option<String>,
    pub attachment: Option<String>,
}

struct InFlight {
    snapshot: Vec<ViewEntry>,
    selection: Selection,
}

/// Client-side cache of the chat list, the open chat, and the turn in
/// flight. Every mutation goes through a method so the invariants hold:
/// one turn at a time, and cancellation restores the pre-call view.
pub struct ClientSession {
    user_id: Uuid,
    store: LocalStateStore,
    state: LocalState,
    chats: Vec<ChatSummary>,
    selection: Selection,
    view: Vec<ViewEntry>,
    in_flight: Option<InFlight>,
    events: broadcast::Sender<ChatListEvent>,
}

impl ClientSession {
    pub fn new(user_id: Uuid, store: LocalStateStore) -> Self {
        let state = store.load();
        let (events, _) = broadcast::channel(64);
        Self {
            user_id,
            store,
            state,
            chats: Vec::new(),
            selection: Selection::Draft,
            view: Vec::new(),
            in_flight: None,
            events,
        }
    }

    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn view(&self) -> &[ViewEntry] {
        &self.view
    }

    pub fn local_state(&self) -> &LocalState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatListEvent> {
        self.events.subscribe()
    }

    /// Replaces the cached chat list and settles the selection: the stored
    /// pointer if it still names a chat, else the newest chat, else a draft.
    pub fn reconcile(&mut self, mut chats: Vec<ChatSummary>) -> Selection {
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.chats = chats;

        let next = match resolve_active_chat(self.state.active_chat_id.as_deref(), &self.chats) {
            ActiveChat::Existing(id) => Selection::Saved(id),
            ActiveChat::CreateNew => Selection::Draft,
        };
        self.select(next);
        next
    }

    /// Shows a chat loaded from the server.
    pub fn open_chat(&mut self, chat: &Chat) {
        self.select(Selection::Saved(chat.id));
        self.view = chat.messages.iter().cloned().map(ViewEntry::Message).collect();
        self.upsert_summary(chat.to_summary());
    }

    pub fn new_draft(&mut self) -> Result<(), ClientError> {
        if self.is_busy() {
            return Err(ClientError::Busy);
        }
        self.select(Selection::Draft);
        Ok(())
    }

    pub fn rehydrate(&mut self, prefs: &Preferences) {
        self.state.rehydrate(prefs);
        self.persist();
    }

    /// Starts a turn: rejects a second one while the first is outstanding,
    /// snapshots the view, and shows the user's message immediately.
    pub fn begin_turn(&mut self, text: Option<String>, attachment: Option<String>) -> Result<PendingTurn, ClientError> {
        if self.is_busy() {
            return Err(ClientError::Busy);
        }
        let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let attachment = attachment.filter(|a| !a.trim().is_empty());
        if text.is_none() && attachment.is_none() {
            return Err(ClientError::Validation("Type a message or attach an image".into()));
        }

        self.in_flight = Some(InFlight {
            snapshot: self.view.clone(),
            selection: self.selection,
        });
        self.view.push(ViewEntry::Message(Message::new(
            Sender::User,
            text.clone().unwrap_or_default(),
            attachment.clone(),
        )));

        Ok(PendingTurn {
            chat_id: match self.selection {
                Selection::Saved(id) => Some(id),
                Selection::Draft => None,
            },
            text,
            attachment,
        })
    }

    /// Shows the reply and adopts the chat the server answered in.
    pub fn complete_turn(&mut self, response: &SubmitTurnResponse) {
        if self.in_flight.take().is_none() {
            warn!("Completed a turn that was not in flight");
        }
        self.view.push(ViewEntry::Message(Message::new(
            Sender::Assistant,
            response.assistant_text.clone(),
            None,
        )));
        self.adopt_chat(response.chat_id, response.title.clone());
    }

    /// Leaves the user's message in place and adds an inline notice. The
    /// notice lives in the view only.
    pub fn fail_turn(&mut self, error: &ClientError) {
        self.in_flight = None;
        self.view.push(ViewEntry::Notice(error.notice()));

        // The server keeps the unanswered turn; point at its chat so a retry
        // lands there instead of opening another one.
        if let ClientError::Api { chat_id: Some(chat_id), .. } = error {
            self.adopt_chat(*chat_id, None);
        }
    }

    /// Restores the view exactly as it was before [`ClientSession::begin_turn`].
    pub fn cancel_turn(&mut self) {
        match self.in_flight.take() {
            Some(in_flight) => {
                self.view = in_flight.snapshot;
                self.selection = in_flight.selection;
            }
            None => debug!("Cancel without a turn in flight"),
        }
    }

    /// Drops a deleted chat. If it was open, falls back to the newest
    /// remaining chat or a fresh draft, and returns what is selected now.
    pub fn remove_chat(&mut self, chat_id: Uuid) -> Selection {
        self.chats.retain(|c| c.id != chat_id);
        self.emit(ChatListEvent::Deleted {
            user_id: self.user_id,
            chat_id,
        });

        if self.selection == Selection::Saved(chat_id) {
            self.set_pointer(None);
            let next = match resolve_active_chat(None, &self.chats) {
                ActiveChat::Existing(id) => Selection::Saved(id),
                ActiveChat::CreateNew => Selection::Draft,
            };
            self.select(next);
        }
        self.selection
    }

    fn select(&mut self, next: Selection) {
        if self.selection != next {
            self.view.clear();
        }
        self.selection = next;
        self.set_pointer(match next {
            Selection::Saved(id) => Some(id),
            Selection::Draft => None,
        });
    }

    fn adopt_chat(&mut self, chat_id: Uuid, title: Option<String>) {
        self.selection = Selection::Saved(chat_id);
        self.set_pointer(Some(chat_id));

        let now = Utc::now();
        let message_count = self.view.iter().filter(|e| matches!(e, ViewEntry::Message(_))).count();
        let preview = self.view.iter().rev().find_map(|e| match e {
            ViewEntry::Message(m) => Some(preview_of(&m.content)),
            ViewEntry::Notice(_) => None,
        });

        let event = match self.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(summary) => {
                if let Some(title) = &title {
                    summary.title = title.clone();
                }
                summary.updated_at = now;
                summary.message_count = message_count;
                summary.preview = preview;
                ChatListEvent::Updated {
                    user_id: self.user_id,
                    chat_id,
                    title,
                }
            }
            None => {
                let title = title.unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string());
                self.chats.insert(
                    0,
                    ChatSummary {
                        id: chat_id,
                        title: title.clone(),
                        created_at: now,
                        updated_at: now,
                        message_count,
                        preview,
                    },
                );
                ChatListEvent::Created {
                    user_id: self.user_id,
                    chat_id,
                    title,
                }
            }
        };
        self.emit(event);
    }

    fn upsert_summary(&mut self, summary: ChatSummary) {
        match self.chats.iter_mut().find(|c| c.id == summary.id) {
            Some(existing) => *existing = summary,
            None => self.chats.insert(0, summary),
        }
    }

    fn set_pointer(&mut self, chat_id: Option<Uuid>) {
        let pointer = chat_id.map(|id| id.to_string());
        if self.state.active_chat_id == pointer {
            return;
        }
        self.state.active_chat_id = pointer;
        self.persist();
    }

    fn emit(&self, event: ChatListEvent) {
        if self.events.send(event).is_err() {
            debug!("No chat list subscribers");
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!("Failed to save local state to {}: {}", self.store.path().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dreamweaver_types::api::ErrorKind;
    use tempfile::TempDir;

    fn session() -> (TempDir, ClientSession) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStateStore::new(dir.path().join("state.json"));
        (dir, ClientSession::new(Uuid::new_v4(), store))
    }

    fn summary(offset_secs: i64) -> ChatSummary {
        let at = Utc::now() + Duration::seconds(offset_secs);
        ChatSummary {
            id: Uuid::new_v4(),
            title: "chat".into(),
            created_at: at,
            updated_at: at,
            message_count: 2,
            preview: None,
        }
    }

    fn response(chat_id: Uuid, title: Option<&str>) -> SubmitTurnResponse {
        SubmitTurnResponse {
            assistant_text: "I'm here for you.".into(),
            chat_id,
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn reconcile_prefers_pointer_then_newest_then_draft() {
        let (_dir, mut session) = session();
        let old = summary(-60);
        let new = summary(0);

        assert_eq!(session.reconcile(vec![old.clone(), new.clone()]), Selection::Saved(new.id));
        assert_eq!(session.chats()[0].id, new.id);

        session.state.active_chat_id = Some(old.id.to_string());
        assert_eq!(session.reconcile(vec![old.clone(), new.clone()]), Selection::Saved(old.id));

        assert_eq!(session.reconcile(Vec::new()), Selection::Draft);
        assert_eq!(session.local_state().active_chat_id, None);
        assert_eq!(session.reconcile(Vec::new()), Selection::Draft);
    }

    #[test]
    fn stale_pointer_is_discarded() {
        let (_dir, mut session) = session();
        session.state.active_chat_id = Some(Uuid::new_v4().to_string());
        let only = summary(0);

        assert_eq!(session.reconcile(vec![only.clone()]), Selection::Saved(only.id));
        assert_eq!(session.local_state().active_chat_id, Some(only.id.to_string()));
    }

    #[test]
    fn second_turn_while_busy_is_rejected() {
        let (_dir, mut session) = session();
        session.begin_turn(Some("first".into()), None).unwrap();

        assert!(matches!(session.begin_turn(Some("second".into()), None), Err(ClientError::Busy)));
        assert!(matches!(session.new_draft(), Err(ClientError::Busy)));
        assert_eq!(session.view().len(), 1);
    }

    #[test]
    fn blank_turn_is_rejected() {
        let (_dir, mut session) = session();
        assert!(matches!(
            session.begin_turn(Some("  ".into()), Some(String::new())),
            Err(ClientError::Validation(_))
        ));
        assert!(!session.is_busy());
    }

    #[test]
    fn completed_draft_turn_adopts_new_chat() {
        let (dir, mut session) = session();
        let mut events = session.subscribe();
        let turn = session.begin_turn(Some("I feel anxious today".into()), None).unwrap();
        assert_eq!(turn.chat_id, None);

        let chat_id = Uuid::new_v4();
        session.complete_turn(&response(chat_id, Some("I feel anxious today")));

        assert_eq!(session.selection(), Selection::Saved(chat_id));
        assert!(!session.is_busy());
        assert_eq!(session.view().len(), 2);
        assert_eq!(session.chats()[0].title, "I feel anxious today");
        assert_eq!(session.chats()[0].message_count, 2);
        assert!(matches!(events.try_recv().unwrap(), ChatListEvent::Created { .. }));

        let reloaded = LocalStateStore::new(dir.path().join("state.json")).load();
        assert_eq!(reloaded.active_chat_id, Some(chat_id.to_string()));
    }

    #[test]
    fn cancel_restores_snapshot_exactly() {
        let (_dir, mut session) = session();
        let chat_id = Uuid::new_v4();
        session.begin_turn(Some("hello".into()), None).unwrap();
        session.complete_turn(&response(chat_id, Some("hello")));
        let before = session.view().to_vec();

        session.begin_turn(Some("never mind".into()), None).unwrap();
        assert_eq!(session.view().len(), 3);
        session.cancel_turn();

        assert_eq!(session.view(), before.as_slice());
        assert_eq!(session.selection(), Selection::Saved(chat_id));
        assert!(!session.is_busy());
    }

    #[test]
    fn failure_adds_local_notice_and_keeps_user_message() {
        let (_dir, mut session) = session();
        session.begin_turn(Some("are you there".into()), None).unwrap();
        let chat_id = Uuid::new_v4();

        session.fail_turn(&ClientError::Api {
            status: 503,
            kind: ErrorKind::UpstreamTransient,
            message: "unavailable".into(),
            chat_id: Some(chat_id),
        });

        assert!(!session.is_busy());
        assert!(matches!(&session.view()[0], ViewEntry::Message(m) if m.content == "are you there"));
        assert!(matches!(&session.view()[1], ViewEntry::Notice(n) if n.contains("try again")));
        assert_eq!(session.selection(), Selection::Saved(chat_id));
        assert_eq!(session.chats()[0].message_count, 1);
    }

    #[test]
    fn removing_active_chat_falls_back() {
        let (_dir, mut session) = session();
        let mut events = session.subscribe();
        let old = summary(-60);
        let new = summary(0);
        session.reconcile(vec![old.clone(), new.clone()]);
        assert_eq!(session.selection(), Selection::Saved(new.id));

        assert_eq!(session.remove_chat(new.id), Selection::Saved(old.id));
        assert_eq!(session.local_state().active_chat_id, Some(old.id.to_string()));
        assert!(matches!(events.try_recv().unwrap(), ChatListEvent::Deleted { .. }));

        assert_eq!(session.remove_chat(old.id), Selection::Draft);
        assert_eq!(session.local_state().active_chat_id, None);
        assert!(session.chats().is_empty());
    }

    #[test]
    fn removing_other_chat_keeps_selection() {
        let (_dir, mut session) = session();
        let old = summary(-60);
        let new = summary(0);
        session.reconcile(vec![old.clone(), new.clone()]);

        assert_eq!(session.remove_chat(old.id), Selection::Saved(new.id));
        assert_eq!(session.chats().len(), 1);
    }
}
