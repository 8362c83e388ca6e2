//! Shared data model and wire types for DreamWeaver.
//!
//! `models` holds the persisted shapes (users, chats, messages), `api` the
//! request/response bodies exchanged over HTTP, and `events` the chat-list
//! notifications consumed by clients.

pub mod api;
pub mod events;
pub mod models;
