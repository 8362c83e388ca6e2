//! Session Manager: owns the lifecycle of chats and the ordered turn
//! protocol between a user, the chat store, and the completion service.

pub mod error;
pub mod events;
pub mod manager;
pub mod policy;
pub mod store;

pub use error::SessionError;
pub use events::ChatEvents;
pub use manager::{SessionConfig, SessionManager, TurnInput, TurnOutcome};
pub use policy::{ActiveChat, derive_title, resolve_active_chat, summary_due};
pub use store::{ChatStore, TakenMessage};
