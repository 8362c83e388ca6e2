use axum::{Extension, Json, extract::State};
use chrono::{SecondsFormat, Utc};
use tracing::info;
use uuid::Uuid;

use dreamweaver_db::models::NewFeedback;
use dreamweaver_types::api::{FeedbackRequest, SuccessResponse};

use crate::AppState;
use crate::error::{ApiError, ApiJson, blocking, parse_chat_id};
use crate::middleware::Claims;

/// Rating of a conversation, optionally pinned to one assistant message.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<FeedbackRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::Validation("Rating must be between 1 and 5".into()));
    }
    let chat_id = parse_chat_id(&req.chat_id)?;
    let message_id = match req.message_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(raw) => Some(
            raw.parse::<Uuid>()
                .map_err(|_| ApiError::Validation(format!("Invalid message id: {raw}")))?,
        ),
        None => None,
    };
    let text = req.feedback.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());

    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let feedback_id = Uuid::new_v4().to_string();
    let stored = blocking(move || {
        let chat = chat_id.to_string();
        if !db.chat_exists(&user_id, &chat)? {
            return Ok(false);
        }
        let message = message_id.map(|id| id.to_string());
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        db.insert_feedback(&NewFeedback {
            id: &feedback_id,
            user_id: &user_id,
            chat_id: &chat,
            message_id: message.as_deref(),
            rating: req.rating,
            feedback: text.as_deref(),
            technical_slipped: req.technical_slipped,
            created_at: &created_at,
        })?;
        Ok(true)
    })
    .await?;

    if !stored {
        return Err(ApiError::chat_not_found());
    }

    info!("Recorded {}-star feedback on chat {}", req.rating, chat_id);
    Ok(Json(SuccessResponse { success: true }))
}
