//! Palaver Core Library
//!
//! This crate provides the core functionality for Palaver, a minimal
//! real-time chat client: it authenticates a user, loads recent history,
//! and keeps a local view of users and messages synchronized with the
//! server's live event stream.
//!
//! # Architecture
//!
//! - **Transport**: one long-lived WebSocket carrying JSON frames;
//!   request/response pairs matched by correlation id, server-pushed
//!   `created` events fanned out to subscribers
//! - **Session**: authentication lifecycle and the persisted token
//! - **Feeds**: one per remote collection (`users`, `messages`)
//! - **Sync core**: reconciles the bootstrap snapshot with live events and
//!   drives the external `Presenter`
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut client = ChatClient::connect(&config);
//!
//! let handle = client.spawn_sync(presenter)?;
//! client.login(Some(Credentials::new(email, password))).await?;
//! client.send_message("hello").await?;
//! ```
//!
//! # Modules
//!
//! - `client`: top-level `ChatClient` registry (main entry point)
//! - `session`: authentication lifecycle and state transitions
//! - `feed`: generic resource feeds with live creation subscriptions
//! - `sync`: the synchronization state machine and local views
//! - `presenter`: the rendering boundary
//! - `transport`: WebSocket wire protocol and connection management
//! - `models`: users, messages, and creation payloads
//! - `token`: persisted credential token storage
//! - `config`: application configuration

pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod presenter;
pub mod query;
pub mod session;
pub mod sync;
pub mod token;
pub mod transport;

pub use client::ChatClient;
pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use feed::{CreatedSubscription, Feed, Record};
pub use models::{Message, NewMessage, NewUser, User};
pub use presenter::Presenter;
pub use query::{Page, Query};
pub use session::{Credentials, SessionManager, SessionState};
pub use sync::{LocalViews, SyncCore, SyncPhase};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{
    AuthGrant, AuthRequest, ConnectionStatus, CreatedEvent, Transport, WsTransport,
};
