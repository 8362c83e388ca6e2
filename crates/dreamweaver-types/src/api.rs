use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AssistantType, Gender, Language};

// -- JWT Claims --

/// Bearer token claims shared by the REST middleware and token issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Turns --

/// `chat_id` is kept as a raw string: an id that does not resolve for the
/// caller (including a malformed one) starts a new chat instead of failing.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitTurnRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTurnResponse {
    pub assistant_text: String,
    pub chat_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditTurnRequest {
    pub chat_id: String,
    pub original_text: String,
    pub new_text: String,
}

// -- Chats --

/// Acknowledgement for deletions and feedback.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActiveChatQuery {
    pub pointer: Option<String>,
}

// -- Preferences --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreferencesUpdate {
    pub name: String,
    pub gender: String,
    pub assistant_type: String,
    pub language: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Parsed, validated form of a [`PreferencesUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPreferences {
    pub name: String,
    pub gender: Gender,
    pub assistant_type: AssistantType,
    pub language: Language,
    pub avatar_url: Option<String>,
}

// -- Feedback --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackRequest {
    pub chat_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    pub rating: u8,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub technical_slipped: bool,
}

// -- Language --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectLanguageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectLanguageResponse {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: Vec<String>,
}

// -- Errors --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    UpstreamTransient,
    UpstreamPermanent,
    Cancelled,
    Internal,
}

/// JSON body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    /// Chat that holds the dangling user turn of a failed submit, so a retry
    /// can target it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Uuid>,
}
