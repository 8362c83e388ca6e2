use axum::{Extension, Json, extract::State};
use tokio_util::sync::CancellationToken;
use tracing::error;

use dreamweaver_session::{SessionError, TurnInput, TurnOutcome};
use dreamweaver_types::api::{EditTurnRequest, SubmitTurnRequest, SubmitTurnResponse};

use crate::AppState;
use crate::error::{ApiError, ApiJson, parse_chat_id};
use crate::middleware::Claims;

pub async fn submit_turn(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SubmitTurnRequest>,
) -> Result<Json<SubmitTurnResponse>, ApiError> {
    // An id that does not parse cannot name one of the caller's chats, so
    // it starts a new chat like an unknown id would.
    let input = TurnInput {
        text: req.text,
        attachment: req.attachment,
        chat_id: req.chat_id.as_deref().and_then(|id| id.trim().parse().ok()),
    };
    let user_id = claims.sub;

    let outcome = run_turn(state, move |state, cancel| async move {
        state.sessions.submit_turn(user_id, input, &cancel).await
    })
    .await?;
    Ok(Json(response(outcome)))
}

pub async fn edit_turn(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<EditTurnRequest>,
) -> Result<Json<SubmitTurnResponse>, ApiError> {
    let chat_id = parse_chat_id(&req.chat_id)?;
    let user_id = claims.sub;

    let outcome = run_turn(state, move |state, cancel| async move {
        state
            .sessions
            .edit_turn(user_id, chat_id, &req.original_text, req.new_text, &cancel)
            .await
    })
    .await?;
    Ok(Json(response(outcome)))
}

/// Runs a turn on its own task. Dropping the handler (the client went away)
/// cancels the token, and the task still gets to undo its partial writes.
async fn run_turn<F, Fut>(state: AppState, turn: F) -> Result<TurnOutcome, ApiError>
where
    F: FnOnce(AppState, CancellationToken) -> Fut,
    Fut: Future<Output = Result<TurnOutcome, SessionError>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let task = tokio::spawn(turn(state, cancel));
    let outcome = task.await.map_err(|e| {
        error!("turn task join error: {}", e);
        ApiError::Internal("turn task failed".into())
    })??;
    Ok(outcome)
}

fn response(outcome: TurnOutcome) -> SubmitTurnResponse {
    SubmitTurnResponse {
        assistant_text: outcome.assistant_text,
        chat_id: outcome.chat_id,
        title: outcome.title,
    }
}
