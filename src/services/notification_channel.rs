// src/services/notification_channel.rs
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing;

use crate::{
    models::{ClientFrame, ConnectionState, Notification, ServerFrame},
    services::api_client::CredentialProvider,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Authentication rejected by server")]
    AuthenticationRejected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No authentication acknowledgement within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Channel is not authenticated")]
    NotAuthenticated,

    #[error("No bearer credential available")]
    MissingCredential,

    #[error("Channel closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Typed events for channel observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChanged(ConnectionState),
    Notification(Notification),
    UnreadCount(u32),
    AuthenticationFailed,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub max_attempts: u32,
    pub handshake_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/notifications/".to_string(),
            reconnect_delay: Duration::from_secs(3),
            max_attempts: 5,
            handshake_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}

/// One open bidirectional connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError>;
    /// `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String, ChannelError>>;
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChannelError>;
}

/// WebSocket transport used in production.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChannelError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<String, ChannelError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue, // ping/pong are answered by tungstenite
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

/// Lossless per-observer queues. Unlike the broadcast registry these never
/// drop events for a slow reader.
type FeedRegistry = Arc<Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>>;

struct DriverHandle {
    task: JoinHandle<()>,
    commands: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
}

/// Authenticated, self-healing connection to the notification service.
pub struct NotificationChannel {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    events_tx: broadcast::Sender<ChannelEvent>,
    feeds: FeedRegistry,
    driver: Mutex<Option<DriverHandle>>,
}

impl NotificationChannel {
    pub fn new(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            connector,
            credentials,
            state_tx: Arc::new(state_tx),
            events_tx,
            feeds: Arc::new(Mutex::new(Vec::new())),
            driver: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Registers an observer. Dropping the receiver unsubscribes.
    ///
    /// A reader more than `event_capacity` events behind loses the oldest
    /// ones; use `feed()` where every frame matters.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    /// Unbounded queue of `Notification` and `UnreadCount` events in arrival
    /// order. Dropping the receiver unsubscribes.
    pub fn feed(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock_feeds(&self.feeds).push(tx);
        rx
    }

    /// Starts connecting with a fresh attempt budget. No-op while a
    /// connection (or pending reconnect) is already being driven.
    pub fn connect(&self) -> Result<(), ChannelError> {
        let mut slot = match self.driver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if slot.as_ref().is_some_and(|d| !d.task.is_finished()) {
            return Ok(());
        }

        if self.credentials.bearer_token().is_none() {
            return Err(ChannelError::MissingCredential);
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        publish_state(&self.state_tx, &self.events_tx, ConnectionState::Connecting);

        let driver = ChannelDriver {
            config: self.config.clone(),
            connector: self.connector.clone(),
            credentials: self.credentials.clone(),
            state_tx: self.state_tx.clone(),
            events_tx: self.events_tx.clone(),
            feeds: self.feeds.clone(),
            commands: commands_rx,
            shutdown: shutdown_rx,
        };

        *slot = Some(DriverHandle {
            task: tokio::spawn(driver.run()),
            commands: commands_tx,
            shutdown: shutdown_tx,
        });
        Ok(())
    }

    /// Closes the transport and cancels any scheduled reconnect.
    pub async fn disconnect(&self) {
        let handle = match self.driver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(mut handle) = handle {
            let _ = handle.shutdown.send(true);
            if tokio::time::timeout(Duration::from_secs(1), &mut handle.task).await.is_err() {
                handle.task.abort();
            }
            tracing::info!("Notification channel disconnected");
        }

        publish_state(&self.state_tx, &self.events_tx, ConnectionState::Disconnected);
    }

    /// Sends a frame on the authenticated connection. Never queued.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), ChannelError> {
        if self.state() != ConnectionState::Authenticated {
            return Err(ChannelError::NotAuthenticated);
        }

        let frame = serde_json::to_string(message).map_err(|e| ChannelError::Serialization(e.to_string()))?;

        let slot = match self.driver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(driver) => driver.commands.send(frame).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        let handle = match self.driver.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.task.abort();
        }
    }
}

fn lock_feeds(feeds: &FeedRegistry) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ChannelEvent>>> {
    match feeds.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn publish_state(
    state_tx: &watch::Sender<ConnectionState>,
    events_tx: &broadcast::Sender<ChannelEvent>,
    state: ConnectionState,
) {
    let changed = state_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
    if changed {
        tracing::debug!("Notification channel state: {:?}", state);
        let _ = events_tx.send(ChannelEvent::StateChanged(state));
    }
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        // Handle dropped
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

enum SessionEnd {
    Shutdown,
    AuthRejected,
    NoCredential,
    Failed { error: ChannelError, was_authenticated: bool },
}

struct ChannelDriver {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    events_tx: broadcast::Sender<ChannelEvent>,
    feeds: FeedRegistry,
    commands: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
}

impl ChannelDriver {
    fn publish(&self, state: ConnectionState) {
        publish_state(&self.state_tx, &self.events_tx, state);
    }

    fn emit(&self, event: ChannelEvent) {
        // No observers is fine
        let _ = self.events_tx.send(event);
    }

    /// Delivers a payload event to every feed, then to broadcast observers.
    fn deliver(&self, event: ChannelEvent) {
        lock_feeds(&self.feeds).retain(|feed| feed.send(event.clone()).is_ok());
        self.emit(event);
    }

    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            self.publish(ConnectionState::Connecting);

            match self.run_session().await {
                SessionEnd::Shutdown => return,
                SessionEnd::AuthRejected => {
                    tracing::warn!("Notification channel authentication rejected, not retrying");
                    self.publish(ConnectionState::Disconnected);
                    self.emit(ChannelEvent::AuthenticationFailed);
                    return;
                }
                SessionEnd::NoCredential => {
                    tracing::warn!("Bearer credential disappeared, notification channel stopped");
                    self.publish(ConnectionState::Disconnected);
                    return;
                }
                SessionEnd::Failed { error, was_authenticated } => {
                    if was_authenticated {
                        failures = 0;
                    }
                    failures += 1;

                    if failures >= self.config.max_attempts {
                        tracing::error!(
                            "Notification channel gave up after {} failed attempts: {}",
                            failures,
                            error
                        );
                        self.publish(ConnectionState::PermanentlyDisconnected);
                        return;
                    }

                    tracing::warn!(
                        "Notification channel failed ({}), reconnecting in {:?} (attempt {}/{})",
                        error,
                        self.config.reconnect_delay,
                        failures,
                        self.config.max_attempts
                    );
                    self.publish(ConnectionState::Disconnected);

                    tokio::select! {
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                        _ = wait_shutdown(&mut self.shutdown) => return,
                    }
                }
            }
        }
    }

    async fn run_session(&mut self) -> SessionEnd {
        // Frames accepted before a failure are not replayed on a new connection
        while self.commands.try_recv().is_ok() {
            tracing::debug!("Dropping outbound frame from a previous connection");
        }

        let Some(token) = self.credentials.bearer_token() else {
            return SessionEnd::NoCredential;
        };

        let connector = self.connector.clone();
        let mut transport = tokio::select! {
            result = connector.connect(&self.config.url) => match result {
                Ok(transport) => transport,
                Err(error) => return SessionEnd::Failed { error, was_authenticated: false },
            },
            _ = wait_shutdown(&mut self.shutdown) => return SessionEnd::Shutdown,
        };

        let frame = match serde_json::to_string(&ClientFrame::Authenticate { token }) {
            Ok(frame) => frame,
            Err(e) => {
                transport.close().await;
                return SessionEnd::Failed {
                    error: ChannelError::Serialization(e.to_string()),
                    was_authenticated: false,
                };
            }
        };
        if let Err(error) = transport.send(frame).await {
            transport.close().await;
            return SessionEnd::Failed { error, was_authenticated: false };
        }

        let handshake_timeout = self.config.handshake_timeout;
        let ack = tokio::select! {
            ack = tokio::time::timeout(handshake_timeout, wait_for_ack(transport.as_mut())) => ack,
            _ = wait_shutdown(&mut self.shutdown) => {
                transport.close().await;
                return SessionEnd::Shutdown;
            }
        };

        match ack {
            Err(_elapsed) => {
                transport.close().await;
                return SessionEnd::Failed {
                    error: ChannelError::HandshakeTimeout(handshake_timeout),
                    was_authenticated: false,
                };
            }
            Ok(Err(error)) => {
                transport.close().await;
                return SessionEnd::Failed { error, was_authenticated: false };
            }
            Ok(Ok(false)) => {
                transport.close().await;
                return SessionEnd::AuthRejected;
            }
            Ok(Ok(true)) => {
                tracing::info!("Notification channel authenticated");
                self.publish(ConnectionState::Authenticated);
            }
        }

        loop {
            tokio::select! {
                frame = transport.next_frame() => match frame {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(error)) => {
                        transport.close().await;
                        return SessionEnd::Failed { error, was_authenticated: true };
                    }
                    None => {
                        return SessionEnd::Failed {
                            error: ChannelError::Transport("connection closed by server".to_string()),
                            was_authenticated: true,
                        };
                    }
                },
                Some(outbound) = self.commands.recv() => {
                    if let Err(error) = transport.send(outbound).await {
                        transport.close().await;
                        return SessionEnd::Failed { error, was_authenticated: true };
                    }
                }
                _ = wait_shutdown(&mut self.shutdown) => {
                    transport.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Notification { notification }) => {
                tracing::debug!("Notification received: {}", notification.id);
                self.deliver(ChannelEvent::Notification(notification));
            }
            Ok(ServerFrame::UnreadCount { count }) => {
                self.deliver(ChannelEvent::UnreadCount(count));
            }
            Ok(ServerFrame::Authenticated { .. }) => {
                tracing::debug!("Ignoring repeated authentication acknowledgement");
            }
            Ok(ServerFrame::Unknown) => {
                tracing::debug!("Ignoring frame of unknown type");
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed frame: {}", e);
            }
        }
    }
}

/// Reads until the server acknowledges the authenticate frame.
async fn wait_for_ack(transport: &mut dyn Transport) -> Result<bool, ChannelError> {
    loop {
        match transport.next_frame().await {
            Some(Ok(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(ServerFrame::Authenticated { success }) => return Ok(success),
                Ok(_) | Err(_) => {
                    tracing::debug!("Ignoring frame received before authentication");
                }
            },
            Some(Err(error)) => return Err(error),
            None => {
                return Err(ChannelError::Transport(
                    "connection closed during handshake".to_string(),
                ))
            }
        }
    }
}
