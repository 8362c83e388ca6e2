use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{SecondsFormat, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use dreamweaver_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::AppState;
use crate::error::{ApiError, ApiJson, blocking};

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Name, email, and password are required".into()));
    }
    if !looks_like_email(&email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // Check if email is taken
    let db = state.db.clone();
    let lookup = email.clone();
    if blocking(move || db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?
        .to_string();

    let user_id = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let db = state.db.clone();
    let (row_name, row_email) = (name.clone(), email.clone());
    // A concurrent registration can take the email after the check above.
    let created =
        blocking(move || db.create_user(&user_id.to_string(), &row_name, &row_email, &password_hash, &created_at))
            .await?;
    if !created {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let token = create_token(&state.jwt_secret, user_id, &email, state.token_ttl)?;
    info!("Registered user {}", user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()));
    }

    let db = state.db.clone();
    let user = blocking(move || db.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid_credentials)?;

    let stored = user.password.as_deref().ok_or_else(|| {
        ApiError::Unauthenticated(format!(
            "This account uses {} sign-in. Please log in with that provider.",
            user.provider
        ))
    })?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(stored).map_err(|e| ApiError::Internal(format!("stored hash unreadable: {e}")))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid_credentials())?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(format!("corrupt user id {}: {e}", user.id)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.email, state.token_ttl)?;

    Ok(Json(LoginResponse {
        user_id,
        name: user.name,
        token,
    }))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthenticated("Invalid email or password".into())
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str, ttl: Duration) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (Utc::now().timestamp() as usize).saturating_add(ttl.as_secs() as usize),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("token encoding failed: {e}")))
}
