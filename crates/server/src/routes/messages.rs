use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use skillswap_core::{
    protocol::{ReadReceipt, ServerEvent},
    Message,
};

use crate::{
    error::Result,
    handlers::ws::publish,
    middleware::auth::AuthUser,
    services::messaging::NewMessage,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/:id/read", put(mark_read))
        .route("/:project_id/:recipient_id", get(conversation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub project_id: String,
    pub recipient_id: String,
    pub text: String,
    pub timestamp: i64,
    pub metadata_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationPath {
    pub project_id: String,
    pub recipient_id: String,
}

async fn conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path): Path<ConversationPath>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .messages
        .conversation(&user.id, &path.project_id, &path.recipient_id)
        .await?;
    Ok(Json(messages))
}

/// Sends over REST; sockets in the project room see it like any other
/// message.
async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<Message>> {
    let message = state
        .messages
        .send(
            &user.id,
            NewMessage {
                project_id: body.project_id,
                recipient_id: body.recipient_id,
                text: body.text,
                timestamp: body.timestamp,
                metadata_hash: body.metadata_hash,
                correlation_id: None,
            },
        )
        .await?;

    publish(
        &state,
        &message.project_id,
        None,
        &ServerEvent::NewMessage(message.clone()),
    )
    .await;
    Ok(Json(message))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>> {
    let message = state.messages.mark_read(&user.id, &id).await?;

    publish(
        &state,
        &message.project_id,
        None,
        &ServerEvent::MessageRead(ReadReceipt {
            message_id: message.id.clone(),
            project_id: message.project_id.clone(),
            read_by: user.id,
        }),
    )
    .await;
    Ok(Json(message))
}
