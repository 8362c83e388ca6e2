use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use dreamweaver_types::api::{
    EditTurnRequest, ErrorBody, ErrorKind, LoginRequest, LoginResponse, PreferencesUpdate, RegisterRequest,
    RegisterResponse, SubmitTurnRequest, SubmitTurnResponse, SuccessResponse,
};
use dreamweaver_types::models::{Chat, ChatSummary, Preferences};

use crate::error::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin typed wrapper over the HTTP API. Holds the bearer token once
/// signed in.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        // No overall timeout: turns wait on the model and end by cancellation.
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn sign_out(&mut self) {
        self.token = None;
    }

    pub async fn register(&mut self, name: &str, email: &str, password: &str) -> Result<RegisterResponse, ClientError> {
        let body = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let res: RegisterResponse = send_json(self.http.post(self.url("/register")).json(&body)).await?;
        self.token = Some(res.token.clone());
        Ok(res)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let res: LoginResponse = send_json(self.http.post(self.url("/login")).json(&body)).await?;
        self.token = Some(res.token.clone());
        Ok(res)
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, ClientError> {
        send_json(self.authed(self.http.get(self.url("/api/chats")))?).await
    }

    pub async fn get_chat(&self, chat_id: Uuid) -> Result<Chat, ClientError> {
        send_json(self.authed(self.http.get(self.url(&format!("/api/chats/{chat_id}"))))?).await
    }

    pub async fn create_chat(&self) -> Result<ChatSummary, ClientError> {
        send_json(self.authed(self.http.post(self.url("/api/chats")))?).await
    }

    pub async fn delete_chat(&self, chat_id: Uuid) -> Result<SuccessResponse, ClientError> {
        send_json(self.authed(self.http.delete(self.url(&format!("/api/chats/{chat_id}"))))?).await
    }

    pub async fn active_chat(&self, pointer: Option<&str>) -> Result<ChatSummary, ClientError> {
        let mut req = self.http.get(self.url("/api/chats/active"));
        if let Some(pointer) = pointer {
            req = req.query(&[("pointer", pointer)]);
        }
        send_json(self.authed(req)?).await
    }

    pub async fn submit_turn(&self, body: &SubmitTurnRequest) -> Result<SubmitTurnResponse, ClientError> {
        send_json(self.authed(self.http.post(self.url("/api/emotional-chat")).json(body))?).await
    }

    pub async fn edit_turn(&self, body: &EditTurnRequest) -> Result<SubmitTurnResponse, ClientError> {
        send_json(self.authed(self.http.post(self.url("/api/emotional-chat/edit")).json(body))?).await
    }

    pub async fn get_preferences(&self) -> Result<Preferences, ClientError> {
        send_json(self.authed(self.http.get(self.url("/api/user/preferences")))?).await
    }

    pub async fn update_preferences(&self, body: &PreferencesUpdate) -> Result<Preferences, ClientError> {
        send_json(self.authed(self.http.put(self.url("/api/user/preferences")).json(body))?).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::SignedOut)?;
        Ok(req.bearer_auth(token))
    }
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ClientError> {
    let res = req.send().await?;
    let status = res.status();
    if status.is_success() {
        return Ok(res.json::<T>().await?);
    }

    let body = res.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => ClientError::Api {
            status: status.as_u16(),
            kind: err.kind,
            message: err.message,
            chat_id: err.chat_id,
        },
        // Proxies and the framework itself can answer without our error shape.
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            kind: kind_for_status(status),
            message: if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            },
            chat_id: None,
        },
    })
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
        StatusCode::UNAUTHORIZED => ErrorKind::Unauthenticated,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ErrorKind::UpstreamTransient
        }
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let api = ApiClient::new("http://localhost:3000/").unwrap();
        assert_eq!(api.url("/api/chats"), "http://localhost:3000/api/chats");
    }

    #[test]
    fn bare_status_codes_map_to_kinds() {
        assert_eq!(kind_for_status(StatusCode::UNAUTHORIZED), ErrorKind::Unauthenticated);
        assert_eq!(kind_for_status(StatusCode::BAD_GATEWAY), ErrorKind::UpstreamTransient);
        assert_eq!(kind_for_status(StatusCode::IM_A_TEAPOT), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn calls_without_token_fail_locally() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(api.list_chats().await, Err(ClientError::SignedOut)));
    }
}
