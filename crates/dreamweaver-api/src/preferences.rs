use axum::{Extension, Json, extract::State};
use tracing::{info, warn};

use dreamweaver_db::models::UserRow;
use dreamweaver_types::api::{PreferencesUpdate, ValidPreferences};
use dreamweaver_types::models::{AssistantType, Gender, Language, Preferences};

use crate::AppState;
use crate::error::{ApiError, ApiJson, blocking};
use crate::middleware::Claims;

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Preferences>, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let user = blocking(move || db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(preferences_of(user)))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PreferencesUpdate>,
) -> Result<Json<Preferences>, ApiError> {
    let prefs = validate(req)?;

    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let user = blocking(move || {
        let updated = db.update_preferences(
            &user_id,
            &prefs.name,
            prefs.gender.as_str(),
            prefs.assistant_type.as_str(),
            prefs.language.as_str(),
            prefs.avatar_url.as_deref(),
        )?;
        if !updated {
            return Ok(None);
        }
        db.get_user_by_id(&user_id)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!("Updated preferences of user {}", claims.sub);
    Ok(Json(preferences_of(user)))
}

/// Checks every field against its closed set. Name is required.
pub fn validate(req: PreferencesUpdate) -> Result<ValidPreferences, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    let gender = Gender::parse(&req.gender).ok_or_else(|| ApiError::Validation("Invalid gender value".into()))?;
    let assistant_type = AssistantType::parse(&req.assistant_type)
        .ok_or_else(|| ApiError::Validation("Invalid assistant type value".into()))?;
    let language =
        Language::parse(&req.language).ok_or_else(|| ApiError::Validation("Invalid language value".into()))?;

    Ok(ValidPreferences {
        name,
        gender,
        assistant_type,
        language,
        avatar_url: req.avatar_url.map(|url| url.trim().to_string()).filter(|url| !url.is_empty()),
    })
}

fn preferences_of(user: UserRow) -> Preferences {
    Preferences {
        gender: closed_value(&user, "gender", user.gender.as_deref(), Gender::parse),
        assistant_type: closed_value(&user, "assistant type", user.assistant_type.as_deref(), AssistantType::parse),
        language: closed_value(&user, "language", user.language.as_deref(), Language::parse),
        name: user.name,
        email: user.email,
        avatar_url: user.avatar_url,
    }
}

/// Stored values were validated on the way in; anything else is dropped.
fn closed_value<T>(user: &UserRow, field: &str, raw: Option<&str>, parse: fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!("Ignoring unknown {} value {:?} for user {}", field, raw, user.id);
    }
    parsed
}
