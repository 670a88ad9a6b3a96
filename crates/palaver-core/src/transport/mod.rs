//! Server transport
//!
//! One long-lived WebSocket to the chat server carrying JSON frames:
//! request/response pairs matched by correlation id, plus server-pushed
//! `created` events fanned out to subscribers in arrival order.
//!
//! The [`Transport`] trait is the seam between the protocol plumbing and
//! the session manager / resource feeds, so both can be exercised against
//! a scripted in-memory transport in tests.

mod message;
mod ws;

pub use message::{ClientMessage, ServerMessage, STRATEGY_JWT, STRATEGY_LOCAL};
pub use ws::WsTransport;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::error::ClientResult;
use crate::models::User;
use crate::query::Query;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
}

/// A record creation pushed by the server
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    /// Collection the record was created in
    pub collection: String,
    /// The canonical record, as the server stored it
    pub record: Value,
}

/// Authentication request payload
#[derive(Debug, Clone)]
pub enum AuthRequest {
    /// Password-based authentication
    Password { email: String, password: String },
    /// Persisted-token authentication
    Token { token: String },
}

/// A granted authentication: the (possibly refreshed) token and the user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub access_token: String,
    pub user: User,
}

/// Asynchronous transport to the chat server
///
/// Every request-style operation completes exactly once: with the server's
/// reply, with a transport error when the connection drops mid-flight, or
/// with a timeout as the backstop.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Authenticate; resolves with the granted token and user
    async fn authenticate(&self, request: AuthRequest) -> ClientResult<AuthGrant>;

    /// Invalidate the server-side session (best effort)
    async fn logout(&self) -> ClientResult<()>;

    /// Fetch a page of records from a collection
    async fn find(&self, collection: &str, query: Query) -> ClientResult<Value>;

    /// Create a record; resolves with the canonical server record
    async fn create(&self, collection: &str, record: Value) -> ClientResult<Value>;

    /// Subscribe to creation events for all collections
    ///
    /// Events arrive in server-acceptance order; feeds filter by
    /// collection.
    fn subscribe_created(&self) -> broadcast::Receiver<CreatedEvent>;

    /// Watch the connection status
    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Close the connection and stop background work
    async fn shutdown(&self);
}
