// WebSocket handler for project-scoped chat.
// Each socket joins any number of project rooms; a room is a broadcast
// channel that fans frames out to every joined socket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use skillswap_core::{
    protocol::{ClientEvent, OutgoingMessage, ReadReceipt, Ready, ServerEvent, SocketError},
    validate_id,
};
use tokio::{
    sync::{broadcast, mpsc, RwLock},
    task::JoinHandle,
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::{sync_user, verify_token, AuthUser},
    services::messaging::NewMessage,
    AppState,
};

/// A serialized server frame published to a room. `origin` names the socket
/// that caused it so that socket is not echoed twice.
#[derive(Debug, Clone)]
pub struct RoomFrame {
    pub origin: Option<String>,
    pub payload: Arc<str>,
}

// Room state for broadcasting messages
pub struct RoomState {
    pub broadcast: broadcast::Sender<RoomFrame>,
}

impl RoomState {
    pub fn new(capacity: usize) -> Self {
        let (broadcast, _) = broadcast::channel(capacity);
        Self { broadcast }
    }
}

// Room registry - keyed by project id
pub type RoomRegistry = Arc<RwLock<HashMap<String, Arc<RoomState>>>>;

pub fn create_room_registry() -> RoomRegistry {
    Arc::new(RwLock::new(HashMap::new()))
}

async fn get_or_create_room(state: &AppState, project_id: &str) -> Arc<RoomState> {
    let mut registry = state.rooms.write().await;
    registry
        .entry(project_id.to_string())
        .or_insert_with(|| Arc::new(RoomState::new(state.config.room_capacity)))
        .clone()
}

/// Drops the room once nobody is listening.
async fn prune_room(state: &AppState, project_id: &str) {
    let mut registry = state.rooms.write().await;
    if let Some(room) = registry.get(project_id) {
        if room.broadcast.receiver_count() == 0 {
            registry.remove(project_id);
        }
    }
}

/// Publishes an event to every socket in the project room, except `origin`.
pub async fn publish(
    state: &AppState,
    project_id: &str,
    origin: Option<&str>,
    event: &ServerEvent,
) {
    let Some(payload) = encode(event) else {
        return;
    };
    let registry = state.rooms.read().await;
    if let Some(room) = registry.get(project_id) {
        // No receivers is not an error: nobody has the room open.
        let _ = room.broadcast.send(RoomFrame {
            origin: origin.map(str::to_string),
            payload: payload.into(),
        });
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    serde_json::to_string(event)
        .map_err(|err| tracing::error!(error = %err, "failed to encode server event"))
        .ok()
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Authenticates once, at upgrade time. The token comes from the
/// `Authorization` header, or the `token` query parameter for clients that
/// cannot set headers on an upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    State(state): State<AppState>,
) -> Result<Response> {
    let token = bearer
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .or(query.token)
        .ok_or(AppError::Unauthorized)?;

    let user = verify_token(&token, &state.config.jwt_secret)?;
    sync_user(&state.db.pool, &user).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user, state)))
}

async fn handle_socket(socket: WebSocket, user: AuthUser, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    // Single writer task; rooms and the session push frames through the channel.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut session = SocketSession {
        connection_id: Uuid::new_v4().to_string(),
        user,
        state,
        outbound,
        rooms: HashMap::new(),
    };

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user.id,
        "socket connected"
    );
    session.emit(&ServerEvent::Ready(Ready {
        user_id: session.user.id.clone(),
    }));

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => session.handle(event).await,
                Err(err) => session.emit(&ServerEvent::Error(
                    SocketError::new("Invalid event").with_details(err.to_string()),
                )),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.close().await;
    let _ = writer.await;
}

struct SocketSession {
    connection_id: String,
    user: AuthUser,
    state: AppState,
    outbound: mpsc::UnboundedSender<String>,
    rooms: HashMap<String, JoinHandle<()>>,
}

impl SocketSession {
    fn emit(&self, event: &ServerEvent) {
        if let Some(payload) = encode(event) {
            let _ = self.outbound.send(payload);
        }
    }

    fn emit_error(&self, message: &str, err: &AppError, correlation_id: Option<String>) {
        self.emit(&ServerEvent::Error(
            SocketError::new(message)
                .with_details(err.to_string())
                .correlated(correlation_id),
        ));
    }

    async fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinProject(room) => {
                let joined = self.join(&room.project_id).await;
                match joined {
                    Ok(()) => self.emit(&ServerEvent::Joined(room)),
                    Err(err) => {
                        self.emit_error("Failed to join project", &err, Some(room.project_id))
                    }
                }
            }
            ClientEvent::LeaveProject(room) => self.leave(&room.project_id).await,
            ClientEvent::SendMessage(msg) => self.send_message(msg).await,
            ClientEvent::MarkMessageRead(mark) => {
                if let Err(err) = self.mark_read(&mark.message_id).await {
                    self.emit_error("Failed to mark message as read", &err, None);
                }
            }
        }
    }

    async fn join(&mut self, project_id: &str) -> Result<()> {
        validate_id("Project", project_id)?;
        if self.rooms.contains_key(project_id) {
            return Ok(());
        }

        let project = self.state.projects.fetch(project_id).await?;
        if !project.is_participant(&self.user.id) {
            return Err(AppError::Forbidden(
                "Not authorized to join this project".to_string(),
            ));
        }

        let room = get_or_create_room(&self.state, project_id).await;
        let stream = BroadcastStream::new(room.broadcast.subscribe());
        let handle = tokio::spawn(forward_room(
            stream,
            self.connection_id.clone(),
            self.outbound.clone(),
        ));
        self.rooms.insert(project_id.to_string(), handle);

        tracing::debug!(
            connection_id = %self.connection_id,
            project_id,
            "joined project room"
        );
        Ok(())
    }

    async fn leave(&mut self, project_id: &str) {
        if let Some(handle) = self.rooms.remove(project_id) {
            handle.abort();
            let _ = handle.await;
            prune_room(&self.state, project_id).await;
            tracing::debug!(
                connection_id = %self.connection_id,
                project_id,
                "left project room"
            );
        }
    }

    async fn send_message(&mut self, msg: OutgoingMessage) {
        let correlation_id = msg.correlation_id.clone();
        let new = NewMessage {
            project_id: msg.project_id,
            recipient_id: msg.receiver_id,
            text: msg.text,
            timestamp: msg.timestamp,
            metadata_hash: msg.metadata_hash,
            correlation_id: msg.correlation_id,
        };

        match self.state.messages.send(&self.user.id, new).await {
            Ok(message) => {
                let project_id = message.project_id.clone();
                let event = ServerEvent::NewMessage(message);
                // The direct copy is the sender's acknowledgement.
                self.emit(&event);
                publish(&self.state, &project_id, Some(&self.connection_id), &event).await;
            }
            Err(err) => {
                tracing::debug!(error = %err, "socket message rejected");
                self.emit_error("Failed to send message", &err, correlation_id);
            }
        }
    }

    async fn mark_read(&mut self, message_id: &str) -> Result<()> {
        let message = self.state.messages.mark_read(&self.user.id, message_id).await?;
        let event = ServerEvent::MessageRead(ReadReceipt {
            message_id: message.id,
            project_id: message.project_id.clone(),
            read_by: self.user.id.clone(),
        });
        self.emit(&event);
        publish(
            &self.state,
            &message.project_id,
            Some(&self.connection_id),
            &event,
        )
        .await;
        Ok(())
    }

    async fn close(mut self) {
        let joined: Vec<String> = self.rooms.keys().cloned().collect();
        for project_id in joined {
            self.leave(&project_id).await;
        }
        tracing::info!(
            connection_id = %self.connection_id,
            user_id = %self.user.id,
            "socket disconnected"
        );
    }
}

async fn forward_room(
    mut stream: BroadcastStream<RoomFrame>,
    connection_id: String,
    outbound: mpsc::UnboundedSender<String>,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(frame) => {
                if frame.origin.as_deref() == Some(connection_id.as_str()) {
                    continue;
                }
                if outbound.send(frame.payload.to_string()).is_err() {
                    break;
                }
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(%connection_id, skipped, "socket lagging behind room");
            }
        }
    }
}
