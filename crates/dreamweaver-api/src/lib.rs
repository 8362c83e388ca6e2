//! HTTP boundary of the companion service: authentication, chats, turns,
//! preferences, feedback, and language detection.

pub mod auth;
pub mod chats;
pub mod error;
pub mod feedback;
pub mod language;
pub mod middleware;
pub mod preferences;
pub mod turns;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

use dreamweaver_completion::{CompletionService, LanguageDetector};
use dreamweaver_db::Database;
use dreamweaver_session::{SessionConfig, SessionManager};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: SessionManager,
    pub language: Arc<LanguageDetector>,
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub language_cache_ttl: Duration,
    pub session: SessionConfig,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, completion: Arc<dyn CompletionService>, config: ApiConfig) -> AppState {
        let language = Arc::new(LanguageDetector::new(completion.clone(), config.language_cache_ttl));
        let sessions = SessionManager::new(db.clone(), completion)
            .with_language_detector(language.clone())
            .with_config(config.session);

        Arc::new(Self {
            db,
            sessions,
            language,
            jwt_secret: config.jwt_secret,
            token_ttl: config.token_ttl,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/emotional-chat", post(turns::submit_turn))
        .route("/api/emotional-chat/edit", post(turns::edit_turn))
        .route("/api/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/api/chats/active", get(chats::active_chat))
        .route("/api/chats/{chat_id}", get(chats::get_chat).delete(chats::delete_chat))
        .route(
            "/api/user/preferences",
            get(preferences::get_preferences).put(preferences::update_preferences),
        )
        .route("/api/feedback", post(feedback::submit_feedback))
        .route("/api/detect-language", post(language::detect_language))
        .route("/api/cache-stats", get(language::cache_stats))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
