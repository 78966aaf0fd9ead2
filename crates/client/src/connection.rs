//! The real-time connection.
//!
//! A [`Connection`] owns one WebSocket, driven by a background task. Callers
//! talk to the driver through channels: commands go in over an unbounded
//! queue, server events fan out over a broadcast channel, and the link state
//! is published on a watch channel.
//!
//! The driver reconnects on its own. A transport-level drop is retried
//! `reconnect_attempts` times with a fixed `reconnect_delay` in between; a
//! close frame from the server is answered with one immediate reconnect.
//! Rooms joined before the drop are joined again afterwards. Anything queued
//! while the link is down is discarded.

use std::{
    collections::HashSet,
    sync::Mutex,
    time::Duration,
};

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use skillswap_core::{
    metadata_hash, new_id,
    protocol::{ClientEvent, MarkRead, OutgoingMessage, ProjectRoom, ReadReceipt, ServerEvent},
    validate_id, validate_user_id, Message,
};
use tokio::{
    net::TcpStream,
    sync::{
        broadcast::{self, error::RecvError},
        mpsc::{self, error::TryRecvError},
        watch,
    },
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_stream::{wrappers::BroadcastStream, Stream};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message as Frame,
    },
    MaybeTlsStream, WebSocketStream,
};

use crate::{
    config::{ClientConfig, ConnectOptions},
    error::{ClientError, Result},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting { attempt: u32 },
    /// Closed by the owner, or the reconnect budget ran out.
    Disconnected,
    /// The server refused the token during a reconnect.
    AuthFailed,
}

impl ConnectionState {
    /// No further transitions will happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::AuthFailed)
    }
}

enum Command {
    Emit(ClientEvent),
    Close,
}

pub struct Connection {
    user_id: String,
    options: ConnectOptions,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ServerEvent>,
    state: watch::Receiver<ConnectionState>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Opens the socket and waits for the server's `ready` greeting.
    pub async fn connect(
        config: &ClientConfig,
        token: &str,
        options: ConnectOptions,
    ) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(ClientError::Validation("Token is required".to_string()));
        }

        let (socket, user_id) =
            open_socket(&config.socket_url, token, options.ack_timeout).await?;
        tracing::info!(%user_id, url = %config.socket_url, "socket connected");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (state_tx, state) = watch::channel(ConnectionState::Connected);

        let driver = Driver {
            url: config.socket_url.clone(),
            token: token.to_string(),
            options: options.clone(),
            commands: command_rx,
            events: events.clone(),
            state: state_tx,
            rooms: HashSet::new(),
        };
        let handle = tokio::spawn(driver.run(socket));

        Ok(Self {
            user_id,
            options,
            commands,
            events,
            state,
            driver: Mutex::new(Some(handle)),
        })
    }

    /// The user the server authenticated this socket as.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Number of live event listeners, subscriptions and pending requests
    /// included.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<ServerEvent>> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        Ok(self.events.subscribe())
    }

    /// Every `newMessage` delivered to this socket from now on.
    pub fn messages(&self) -> Result<impl Stream<Item = Message> + Send + Unpin> {
        let events = BroadcastStream::new(self.subscribe()?);
        Ok(tokio_stream::StreamExt::filter_map(events, |event| match event {
            Ok(ServerEvent::NewMessage(message)) => Some(message),
            _ => None,
        }))
    }

    /// Every `messageRead` receipt delivered to this socket from now on.
    pub fn read_receipts(&self) -> Result<impl Stream<Item = ReadReceipt> + Send + Unpin> {
        let events = BroadcastStream::new(self.subscribe()?);
        Ok(tokio_stream::StreamExt::filter_map(events, |event| match event {
            Ok(ServerEvent::MessageRead(receipt)) => Some(receipt),
            _ => None,
        }))
    }

    fn emit(&self, event: ClientEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.commands
            .send(Command::Emit(event))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Emits `event` and waits for the first server event `answer` accepts.
    async fn request<T, F>(&self, event: ClientEvent, mut answer: F) -> Result<T>
    where
        F: FnMut(ServerEvent) -> Option<Result<T>>,
    {
        // Subscribe before emitting so the reply cannot slip past.
        let mut events = self.subscribe()?;
        self.emit(event)?;

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(result) = answer(event) {
                            return result;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "request listener lagged");
                    }
                    Err(RecvError::Closed) => return Err(ClientError::NotConnected),
                }
            }
        };

        // The listener is dropped on every path out of here.
        timeout(self.options.ack_timeout, wait)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Joins a project room and waits for the server to confirm it.
    pub async fn join_project(&self, project_id: &str) -> Result<()> {
        validate_id("Project", project_id)?;
        let room = ProjectRoom {
            project_id: project_id.to_string(),
        };

        self.request(ClientEvent::JoinProject(room), |event| match event {
            ServerEvent::Joined(room) if room.project_id == project_id => Some(Ok(())),
            ServerEvent::Error(err) if err.correlation_id.as_deref() == Some(project_id) => {
                Some(Err(ClientError::Server(err.reason().to_string())))
            }
            _ => None,
        })
        .await
    }

    /// Advisory; without a connection there is nothing to leave.
    pub fn leave_project(&self, project_id: &str) -> Result<()> {
        validate_id("Project", project_id)?;
        let _ = self.commands.send(Command::Emit(ClientEvent::LeaveProject(ProjectRoom {
            project_id: project_id.to_string(),
        })));
        Ok(())
    }

    /// Sends a message and waits for the server's acknowledgement, which is
    /// the stored message carrying our correlation id.
    pub async fn send_message(
        &self,
        project_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> Result<Message> {
        validate_id("Project", project_id)?;
        validate_user_id("Recipient", recipient_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::Validation("Message text is required".to_string()));
        }

        let correlation_id = new_id();
        let timestamp = Utc::now().timestamp_millis();
        let outgoing = OutgoingMessage {
            project_id: project_id.to_string(),
            receiver_id: recipient_id.to_string(),
            text: text.to_string(),
            timestamp,
            metadata_hash: metadata_hash(&self.user_id, recipient_id, timestamp, project_id),
            correlation_id: Some(correlation_id.clone()),
        };

        let result = self
            .request(ClientEvent::SendMessage(outgoing), |event| match event {
                ServerEvent::NewMessage(message)
                    if message.correlation_id.as_deref() == Some(correlation_id.as_str()) =>
                {
                    Some(Ok(message))
                }
                ServerEvent::Error(err)
                    if err.correlation_id.as_deref() == Some(correlation_id.as_str()) =>
                {
                    Some(Err(ClientError::Server(err.reason().to_string())))
                }
                _ => None,
            })
            .await;

        if let Err(err) = &result {
            tracing::debug!(%correlation_id, error = %err, "send failed");
        }
        result
    }

    /// Fire-and-forget; the receipt arrives as a `messageRead` event.
    pub fn mark_message_as_read(&self, message_id: &str) -> Result<()> {
        validate_id("Message", message_id)?;
        self.emit(ClientEvent::MarkMessageRead(MarkRead {
            message_id: message_id.to_string(),
        }))
    }

    /// Closes the socket and waits for the driver to finish.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Close);
        let driver = self.driver.lock().ok().and_then(|mut slot| slot.take());
        if let Some(driver) = driver {
            let _ = driver.await;
        }
    }
}

async fn open_socket(url: &str, token: &str, wait: Duration) -> Result<(Socket, String)> {
    let mut request = url.into_client_request()?;
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| ClientError::Validation("Token contains invalid characters".to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (mut socket, _) = connect_async(request).await?;
    let user_id = timeout(wait, await_ready(&mut socket))
        .await
        .map_err(|_| ClientError::Timeout)??;
    Ok((socket, user_id))
}

/// The server greets every authenticated socket with `ready`.
async fn await_ready(socket: &mut Socket) -> Result<String> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Frame::Text(text) => {
                if let Ok(ServerEvent::Ready(ready)) = serde_json::from_str(&text) {
                    return Ok(ready.user_id);
                }
            }
            Frame::Close(_) => break,
            _ => {}
        }
    }
    Err(ClientError::Socket(
        "connection closed before the server was ready".to_string(),
    ))
}

async fn send_event(socket: &mut Socket, event: &ClientEvent) -> Result<()> {
    let text = serde_json::to_string(event).map_err(|err| ClientError::Socket(err.to_string()))?;
    socket.send(Frame::Text(text)).await?;
    Ok(())
}

enum Ended {
    Shutdown,
    ServerClosed,
    TransportLost,
}

struct Driver {
    url: String,
    token: String,
    options: ConnectOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<ServerEvent>,
    state: watch::Sender<ConnectionState>,
    rooms: HashSet<String>,
}

impl Driver {
    async fn run(mut self, mut socket: Socket) {
        loop {
            let (attempts, delay) = match self.pump(&mut socket).await {
                Ended::Shutdown => {
                    let _ = socket.close(None).await;
                    self.state.send_replace(ConnectionState::Disconnected);
                    tracing::info!("socket closed");
                    return;
                }
                Ended::ServerClosed => {
                    tracing::info!("server closed the socket");
                    (1, Duration::ZERO)
                }
                Ended::TransportLost => {
                    (self.options.reconnect_attempts, self.options.reconnect_delay)
                }
            };

            match self.reconnect(attempts, delay).await {
                Some(fresh) => {
                    socket = fresh;
                    self.rejoin(&mut socket).await;
                }
                None => return,
            }
        }
    }

    async fn pump(&mut self, socket: &mut Socket) -> Ended {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Emit(event)) => {
                        if let ClientEvent::LeaveProject(room) = &event {
                            self.rooms.remove(&room.project_id);
                        }
                        if let Err(err) = send_event(socket, &event).await {
                            tracing::warn!(error = %err, "socket write failed");
                            return Ended::TransportLost;
                        }
                    }
                    Some(Command::Close) | None => return Ended::Shutdown,
                },
                frame = socket.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(Frame::Close(_))) => return Ended::ServerClosed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "socket read failed");
                        return Ended::TransportLost;
                    }
                    None => {
                        tracing::warn!("socket stream ended");
                        return Ended::TransportLost;
                    }
                },
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => {
                if let ServerEvent::Joined(room) = &event {
                    self.rooms.insert(room.project_id.clone());
                }
                // Nobody listening is fine.
                let _ = self.events.send(event);
            }
            Err(err) => tracing::warn!(error = %err, "unrecognised server frame"),
        }
    }

    async fn reconnect(&mut self, attempts: u32, delay: Duration) -> Option<Socket> {
        for attempt in 1..=attempts {
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt });
            if !self.drain() || !self.pause(delay).await {
                self.state.send_replace(ConnectionState::Disconnected);
                return None;
            }

            match open_socket(&self.url, &self.token, self.options.ack_timeout).await {
                Ok((socket, _)) => {
                    tracing::info!(attempt, "socket reconnected");
                    return Some(socket);
                }
                Err(ClientError::Auth(reason)) => {
                    tracing::warn!(%reason, "reconnect refused");
                    self.state.send_replace(ConnectionState::AuthFailed);
                    return None;
                }
                Err(err) => tracing::warn!(attempt, error = %err, "reconnect attempt failed"),
            }
        }

        tracing::warn!(attempts, "giving up on the socket");
        self.state.send_replace(ConnectionState::Disconnected);
        None
    }

    async fn rejoin(&mut self, socket: &mut Socket) {
        let rooms: Vec<String> = self.rooms.iter().cloned().collect();
        for project_id in rooms {
            let event = ClientEvent::JoinProject(ProjectRoom { project_id });
            if let Err(err) = send_event(socket, &event).await {
                // The next read notices the broken link.
                tracing::warn!(error = %err, "rejoin failed");
                break;
            }
        }
        self.state.send_replace(ConnectionState::Connected);
    }

    /// Sleeps for `delay` while discarding queued commands. Returns false
    /// once the owner asked to close.
    async fn pause(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            return true;
        }
        let deadline = sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                command = self.commands.recv() => {
                    if !self.discard(command) {
                        return false;
                    }
                }
            }
        }
    }

    /// Empties the command queue. Returns false once the owner asked to
    /// close.
    fn drain(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.discard(Some(command)) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn discard(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Emit(ClientEvent::LeaveProject(room))) => {
                self.rooms.remove(&room.project_id);
                true
            }
            Some(Command::Emit(_)) => true,
            Some(Command::Close) | None => false,
        }
    }
}
