//! Client core for the companion app: typed API calls plus the local chat
//! cache that a UI renders from.

pub mod api;
pub mod error;
pub mod local_state;
pub mod session;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use dreamweaver_types::api::{EditTurnRequest, ErrorKind, PreferencesUpdate, SubmitTurnRequest, SubmitTurnResponse};
use dreamweaver_types::models::Preferences;

pub use api::ApiClient;
pub use error::ClientError;
pub use local_state::{LocalState, LocalStateStore, Personalization};
pub use session::{ClientSession, PendingTurn, Selection, ViewEntry};

/// Drives a [`ClientSession`] against the server.
pub struct ChatClient {
    api: ApiClient,
    session: ClientSession,
}

impl ChatClient {
    pub fn new(api: ApiClient, session: ClientSession) -> Self {
        Self { api, session }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Loads the chat list and opens whichever chat should be active.
    pub async fn start(&mut self) -> Result<Selection, ClientError> {
        let chats = self.api.list_chats().await?;
        let selection = self.session.reconcile(chats);
        if let Selection::Saved(chat_id) = selection {
            self.open_chat(chat_id).await?;
        }
        Ok(selection)
    }

    pub async fn open_chat(&mut self, chat_id: Uuid) -> Result<(), ClientError> {
        if self.session.is_busy() {
            return Err(ClientError::Busy);
        }
        let chat = self.api.get_chat(chat_id).await?;
        self.session.open_chat(&chat);
        Ok(())
    }

    /// Switches to a draft. Nothing reaches the server until its first turn.
    pub fn new_chat(&mut self) -> Result<(), ClientError> {
        self.session.new_draft()
    }

    /// Sends one turn. Cancelling `cancel` drops the request, which makes the
    /// server roll the turn back, and restores the view.
    pub async fn send(
        &mut self,
        text: Option<String>,
        attachment: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<SubmitTurnResponse, ClientError> {
        let turn = self.session.begin_turn(text, attachment)?;
        let body = SubmitTurnRequest {
            text: turn.text,
            attachment: turn.attachment,
            chat_id: turn.chat_id.map(|id| id.to_string()),
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            res = self.api.submit_turn(&body) => res,
        };
        self.settle(result)
    }

    /// Replaces the most recent user message matching `original_text` and
    /// asks again.
    pub async fn edit(
        &mut self,
        original_text: &str,
        new_text: &str,
        cancel: &CancellationToken,
    ) -> Result<SubmitTurnResponse, ClientError> {
        let Selection::Saved(chat_id) = self.session.selection() else {
            return Err(ClientError::Validation("Only sent messages can be edited".into()));
        };
        self.session.begin_turn(Some(new_text.to_string()), None)?;
        let body = EditTurnRequest {
            chat_id: chat_id.to_string(),
            original_text: original_text.to_string(),
            new_text: new_text.to_string(),
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            res = self.api.edit_turn(&body) => res,
        };
        // On cancel the server puts the original back, matching the restored view.
        let res = self.settle(result)?;

        // The server dropped the original message; show its copy.
        self.open_chat(res.chat_id).await?;
        Ok(res)
    }

    /// Deletes a chat and returns what is selected afterwards.
    pub async fn delete_chat(&mut self, chat_id: Uuid) -> Result<Selection, ClientError> {
        if self.session.is_busy() {
            return Err(ClientError::Busy);
        }
        match self.api.delete_chat(chat_id).await {
            Ok(_) => {}
            Err(ClientError::Api { kind: ErrorKind::NotFound, .. }) => {
                debug!("Chat {} already gone on the server", chat_id);
            }
            Err(e) => return Err(e),
        }

        let was_open = self.session.selection() == Selection::Saved(chat_id);
        let selection = self.session.remove_chat(chat_id);
        if was_open {
            if let Selection::Saved(next) = selection {
                self.open_chat(next).await?;
            }
        }
        Ok(selection)
    }

    /// Pulls preferences from the server and overwrites the local copy.
    pub async fn sync_preferences(&mut self) -> Result<Preferences, ClientError> {
        let prefs = self.api.get_preferences().await?;
        self.session.rehydrate(&prefs);
        Ok(prefs)
    }

    pub async fn update_preferences(&mut self, update: &PreferencesUpdate) -> Result<Preferences, ClientError> {
        let prefs = self.api.update_preferences(update).await?;
        self.session.rehydrate(&prefs);
        Ok(prefs)
    }

    fn settle(&mut self, result: Result<SubmitTurnResponse, ClientError>) -> Result<SubmitTurnResponse, ClientError> {
        match result {
            Ok(res) => {
                self.session.complete_turn(&res);
                Ok(res)
            }
            Err(ClientError::Cancelled) => {
                self.session.cancel_turn();
                Err(ClientError::Cancelled)
            }
            Err(e) => {
                self.session.fail_turn(&e);
                Err(e)
            }
        }
    }
}
