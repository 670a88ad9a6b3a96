//! Top-level client wiring
//!
//! `ChatClient` is the process-wide registry: one transport, one session
//! manager, one feed per collection, constructed once from `Config` and
//! passed explicitly to whatever drives it. Message submission is
//! fire-and-forget with respect to the local views; the created record is
//! rendered only when it echoes back through the live subscription, so the
//! server stays the single source of truth for ordering and canonical
//! fields.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::feed::Feed;
use crate::models::{Message, NewMessage, NewUser, User};
use crate::presenter::Presenter;
use crate::session::{Credentials, SessionManager, SessionState};
use crate::sync::SyncCore;
use crate::token::{FileTokenStore, TokenStore};
use crate::transport::{ConnectionStatus, Transport, WsTransport};

/// The chat client: session, feeds, and transport under one roof
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    session: SessionManager,
    users: Feed<User>,
    messages: Feed<Message>,
    page_size: u32,
}

impl ChatClient {
    /// Connect to the configured server
    ///
    /// The connection is established in the background; operations issued
    /// before it is up fail fast with a transport error.
    pub fn connect(config: &Config) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(WsTransport::connect(config));
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_path()));
        Self::with_transport(transport, tokens, config.page_size)
    }

    /// Assemble a client over an existing transport and token store
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
        page_size: u32,
    ) -> Self {
        let session = SessionManager::new(Arc::clone(&transport), tokens);
        let users = Feed::new(Arc::clone(&transport));
        let messages = Feed::new(Arc::clone(&transport));

        Self {
            transport,
            session,
            users,
            messages,
            page_size,
        }
    }

    /// The session manager
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The users feed
    pub fn users(&self) -> &Feed<User> {
        &self.users
    }

    /// The messages feed
    pub fn messages(&self) -> &Feed<Message> {
        &self.messages
    }

    /// Watch the transport connection status
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.transport.subscribe_status()
    }

    /// Spawn the sync core, wiring it to session transitions and the
    /// connection status
    ///
    /// Can be called once per client; the returned handle resolves with
    /// the core (views and presenter) when the session channel closes.
    pub fn spawn_sync<P: Presenter>(
        &mut self,
        presenter: P,
    ) -> ClientResult<JoinHandle<SyncCore<P>>> {
        let sessions = self
            .session
            .take_events()
            .ok_or(ClientError::SyncAlreadyStarted)?;
        let status = self.transport.subscribe_status();

        let core = SyncCore::new(
            self.users.clone(),
            self.messages.clone(),
            presenter,
            self.page_size,
        );

        Ok(tokio::spawn(core.run(sessions, status)))
    }

    /// Restore the session from the persisted token
    pub async fn restore(&self) -> SessionState {
        self.session.restore().await
    }

    /// Log in with credentials, or from the persisted token when omitted
    pub async fn login(&self, credentials: Option<Credentials>) -> ClientResult<User> {
        self.session.login(credentials).await
    }

    /// Sign out
    pub async fn logout(&self) -> ClientResult<()> {
        self.session.logout().await
    }

    /// Create an account, then log in with the same credentials
    pub async fn signup(&self, credentials: Credentials) -> ClientResult<User> {
        self.users
            .create(&NewUser {
                email: credentials.email.clone(),
                password: credentials.password.clone(),
            })
            .await?;

        self.session.login(Some(credentials)).await
    }

    /// Submit a message
    ///
    /// Resolves with the canonical record but does not add it locally; it
    /// is rendered when the live subscription echoes it.
    pub async fn send_message(&self, text: &str) -> ClientResult<Message> {
        self.messages.create(&NewMessage::new(text)).await
    }

    /// Close the connection and stop background work
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}
