use axum::{Json, extract::State};
use tokio_util::sync::CancellationToken;

use dreamweaver_types::api::{CacheStats, DetectLanguageRequest, DetectLanguageResponse};

use crate::AppState;
use crate::error::{ApiError, ApiJson};

pub async fn detect_language(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DetectLanguageRequest>,
) -> Result<Json<DetectLanguageResponse>, ApiError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("Text is required".into()));
    }

    let code = state.language.detect(text, &CancellationToken::new()).await;
    Ok(Json(DetectLanguageResponse {
        language: code.tag().to_string(),
    }))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.language.stats())
}
