use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use dreamweaver_session::SessionError;
use dreamweaver_types::api::{ErrorBody, ErrorKind};

/// Nginx's "client closed request"; there is no standard code for it.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("The assistant is temporarily unavailable. Please try again.")]
    UpstreamTransient { chat_id: Option<Uuid> },

    #[error("The assistant could not answer this message.")]
    UpstreamPermanent { chat_id: Option<Uuid> },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::UpstreamTransient { .. } => ErrorKind::UpstreamTransient,
            Self::UpstreamPermanent { .. } => ErrorKind::UpstreamPermanent,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamTransient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamPermanent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn chat_not_found() -> Self {
        Self::NotFound("Chat not found".into())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(msg) => Self::Validation(msg),
            SessionError::NotFound => Self::chat_not_found(),
            SessionError::UpstreamTransient { chat_id, .. } => Self::UpstreamTransient { chat_id: Some(chat_id) },
            SessionError::UpstreamPermanent { chat_id, .. } => Self::UpstreamPermanent { chat_id: Some(chat_id) },
            SessionError::Cancelled => Self::Cancelled,
            SessionError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let chat_id = match &self {
            Self::UpstreamTransient { chat_id } | Self::UpstreamPermanent { chat_id } => *chat_id,
            _ => None,
        };

        let body = ErrorBody {
            kind: self.kind(),
            message,
            chat_id,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// `Json` whose rejections render as validation errors in the common
/// error shape.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// Runs blocking database work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("blocking task failed".into())
        })?
        .map_err(ApiError::from)
}

/// Parses a path or body chat id, rejecting malformed ones before any lookup.
pub(crate) fn parse_chat_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid chat id: {raw}")))
}
