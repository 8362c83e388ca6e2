use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use dreamweaver_types::api::{ActiveChatQuery, SuccessResponse};
use dreamweaver_types::models::{Chat, ChatSummary};

use crate::AppState;
use crate::error::{ApiError, parse_chat_id};
use crate::middleware::Claims;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    Ok(Json(state.sessions.list_chats(claims.sub).await?))
}

/// Explicit "new chat": an empty chat with the placeholder title.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.sessions.create_chat(claims.sub).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Chat>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    Ok(Json(state.sessions.get_chat(claims.sub, chat_id).await?))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    state.sessions.delete_chat(claims.sub, chat_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// The chat a client should open, given the pointer it last stored.
pub async fn active_chat(
    State(state): State<AppState>,
    Query(query): Query<ActiveChatQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ChatSummary>, ApiError> {
    Ok(Json(state.sessions.resolve_active_chat(claims.sub, query.pointer).await?))
}
