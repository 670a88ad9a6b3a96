//! WebSocket transport implementation
//!
//! Maintains a long-lived connection to the chat server with automatic
//! reconnection and exponential backoff. Requests are matched to replies
//! through a pending-call map keyed by correlation id; a dropped
//! connection fails every in-flight call, and a per-request timeout is the
//! backstop so no call is left pending forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use super::message::{ClientMessage, ServerMessage};
use super::{AuthGrant, AuthRequest, ConnectionStatus, CreatedEvent, Transport};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::query::Query;

/// Initial reconnect delay
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Maximum reconnect delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Buffered creation events per subscriber
const CREATED_CHANNEL_CAPACITY: usize = 256;

/// Commands sent to the connection task
#[derive(Debug)]
enum TransportCommand {
    /// Send a frame to the server
    Send(String),
    /// Close the connection and stop
    Shutdown,
}

type PendingCalls = HashMap<Uuid, oneshot::Sender<ClientResult<Value>>>;

/// WebSocket transport to the chat server
pub struct WsTransport {
    command_tx: mpsc::Sender<TransportCommand>,
    pending: Arc<Mutex<PendingCalls>>,
    created_tx: broadcast::Sender<CreatedEvent>,
    status_rx: watch::Receiver<ConnectionStatus>,
    request_timeout: Duration,
}

impl WsTransport {
    /// Spawn the connection task and return a handle to it
    ///
    /// The task connects in the background and reconnects automatically
    /// with exponential backoff until `shutdown` is called.
    pub fn connect(config: &Config) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (created_tx, _) = broadcast::channel(CREATED_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let pending = Arc::new(Mutex::new(PendingCalls::new()));

        tokio::spawn(connection_task_loop(
            config.server_url.clone(),
            command_rx,
            Arc::clone(&pending),
            created_tx.clone(),
            status_tx,
        ));

        Self {
            command_tx,
            pending,
            created_tx,
            status_rx,
            request_timeout: config.request_timeout(),
        }
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Send a request and await its reply
    async fn call(&self, msg: ClientMessage) -> ClientResult<Value> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }

        let id = msg.id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, reply_tx);

        if self
            .command_tx
            .send(TransportCommand::Send(msg.encode()))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::NotConnected);
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // Reply sender dropped without resolving: connection task is gone
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout {
                    seconds: self.request_timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn authenticate(&self, request: AuthRequest) -> ClientResult<AuthGrant> {
        let id = Uuid::new_v4();
        let msg = match &request {
            AuthRequest::Password { email, password } => {
                ClientMessage::authenticate_password(id, email, password)
            }
            AuthRequest::Token { token } => ClientMessage::authenticate_token(id, token),
        };

        let data = self.call(msg).await?;
        serde_json::from_value(data)
            .map_err(|e| ClientError::Protocol(format!("malformed auth grant: {}", e)))
    }

    async fn logout(&self) -> ClientResult<()> {
        self.call(ClientMessage::logout(Uuid::new_v4())).await?;
        Ok(())
    }

    async fn find(&self, collection: &str, query: Query) -> ClientResult<Value> {
        self.call(ClientMessage::find(Uuid::new_v4(), collection, query))
            .await
    }

    async fn create(&self, collection: &str, record: Value) -> ClientResult<Value> {
        self.call(ClientMessage::create(Uuid::new_v4(), collection, record))
            .await
    }

    fn subscribe_created(&self) -> broadcast::Receiver<CreatedEvent> {
        self.created_tx.subscribe()
    }

    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    async fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown).await;
    }
}

/// Main connection loop with reconnection
async fn connection_task_loop(
    url: String,
    mut command_rx: mpsc::Receiver<TransportCommand>,
    pending: Arc<Mutex<PendingCalls>>,
    created_tx: broadcast::Sender<CreatedEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

    loop {
        let _ = status_tx.send(ConnectionStatus::Connecting);

        match connect_and_serve(&url, &mut command_rx, &pending, &created_tx, &status_tx).await {
            Ok(true) => {
                // Shutdown requested
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                fail_pending(&pending, ClientError::ConnectionClosed).await;
                break;
            }
            Ok(false) => {
                // Connection closed normally, reset backoff
                reconnect_delay = INITIAL_RECONNECT_DELAY;
            }
            Err(e) => {
                warn!("Connection error ({}): {}", url, e);
            }
        }

        let _ = status_tx.send(ConnectionStatus::Disconnected);
        fail_pending(&pending, ClientError::ConnectionClosed).await;

        // Wait before reconnecting, but keep honoring shutdown
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {
                reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Shutdown) | None => break,
                    Some(TransportCommand::Send(_)) => {
                        // Not connected; the pending call resolves via its
                        // timeout backstop
                    }
                }
            }
        }
    }
}

/// Serve one connection until disconnect or shutdown
///
/// Returns `Ok(true)` when shutdown was requested, `Ok(false)` on a normal
/// close by the server.
async fn connect_and_serve(
    url: &str,
    command_rx: &mut mpsc::Receiver<TransportCommand>,
    pending: &Arc<Mutex<PendingCalls>>,
    created_tx: &broadcast::Sender<CreatedEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
) -> Result<bool, ClientError> {
    debug!("Connecting to {}", url);
    let (ws_stream, _response) = connect_async(url).await?;

    let _ = status_tx.send(ConnectionStatus::Connected);
    debug!("Connected to {}", url);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Send(frame)) => {
                        write.send(Message::Text(frame)).await?;
                    }
                    Some(TransportCommand::Shutdown) | None => {
                        write.close().await.ok();
                        return Ok(true);
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(frame))) => {
                        handle_frame(&frame, pending, created_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Ok(false);
                    }
                    Some(Err(e)) => {
                        return Err(e.into());
                    }
                    _ => {
                        // Ping/pong/binary - ignore
                    }
                }
            }
        }
    }
}

/// Dispatch one inbound frame
async fn handle_frame(
    frame: &str,
    pending: &Arc<Mutex<PendingCalls>>,
    created_tx: &broadcast::Sender<CreatedEvent>,
) {
    match ServerMessage::decode(frame) {
        Ok(ServerMessage::Result { id, data }) => {
            if let Some(reply_tx) = pending.lock().await.remove(&id) {
                let _ = reply_tx.send(Ok(data));
            } else {
                debug!("Reply for unknown request {}", id);
            }
        }
        Ok(ServerMessage::Error {
            id: Some(id),
            name,
            message,
        }) => {
            if let Some(reply_tx) = pending.lock().await.remove(&id) {
                let _ = reply_tx.send(Err(ClientError::from_wire(&name, &message)));
            }
        }
        Ok(ServerMessage::Error {
            id: None,
            name,
            message,
        }) => {
            warn!("Server error: {}: {}", name, message);
        }
        Ok(ServerMessage::Created { collection, record }) => {
            // No subscribers is fine; events are only meaningful mid-session
            let _ = created_tx.send(CreatedEvent { collection, record });
        }
        Err(e) => {
            warn!("Failed to decode frame: {}", e);
        }
    }
}

/// Fail every in-flight call with the given error
async fn fail_pending(pending: &Arc<Mutex<PendingCalls>>, err: ClientError) {
    let mut calls = pending.lock().await;
    for (_, reply_tx) in calls.drain() {
        let _ = reply_tx.send(Err(err.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server_url: "ws://127.0.0.1:1".to_string(),
            data_dir: std::env::temp_dir(),
            page_size: 25,
            request_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_transport_starts_disconnected() {
        let transport = WsTransport::connect(&test_config());
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_call_while_disconnected_fails_fast() {
        let transport = WsTransport::connect(&test_config());

        let result = transport.find("messages", Query::all()).await;
        assert_eq!(result.unwrap_err(), ClientError::NotConnected);
    }

    #[tokio::test]
    async fn test_no_pending_entry_left_after_failed_call() {
        let transport = WsTransport::connect(&test_config());

        let _ = transport.find("messages", Query::all()).await;
        assert!(transport.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = WsTransport::connect(&test_config());
        transport.shutdown().await;
        transport.shutdown().await;
    }
}
