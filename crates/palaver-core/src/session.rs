//! Session lifecycle management
//!
//! Owns the authentication state and the persisted credential token.
//! Failure is a state, not an exception: `restore` never errors, and a
//! failed login leaves the session in `Failed` with a human-readable
//! reason.
//!
//! Every state transition is emitted on an ordered event channel for the
//! sync core (which must observe logout-then-login sequences losslessly)
//! and mirrored on a `watch` channel for passive observers.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::models::User;
use crate::token::{self, TokenStore};
use crate::transport::{AuthRequest, Transport};

/// Login credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Authentication state
///
/// The current user exists exactly when the state is `Authenticated`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No session
    Anonymous,
    /// Authentication in flight
    Authenticating,
    /// Logged in as the given user
    Authenticated(User),
    /// Authentication failed with a human-readable reason
    Failed(String),
}

impl SessionState {
    /// The authenticated user, if any
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Session manager
///
/// Construct once per process; transitions are driven only through
/// `restore`, `login`, and `logout`.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    event_tx: mpsc::UnboundedSender<SessionState>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionState>>,
}

impl SessionManager {
    /// Create a session manager starting in `Anonymous`
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Anonymous);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            tokens,
            state_tx,
            state_rx,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Take the ordered transition channel (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionState>> {
        self.event_rx.take()
    }

    /// Attempt to restore a session from the persisted token
    ///
    /// With no token (or a locally-expired one) the session stays
    /// `Anonymous` and no network call is made. A token the server rejects
    /// is removed. Transport failures also land in `Anonymous`, but the
    /// token is kept so a later restore can retry.
    pub async fn restore(&self) -> SessionState {
        let Some(token) = self.tokens.get() else {
            debug!("No persisted token to restore");
            self.transition(SessionState::Anonymous);
            return self.state();
        };

        if token::token_expired(&token) {
            info!("Persisted token expired, discarding");
            if let Err(e) = self.tokens.remove() {
                warn!("Failed to remove expired token: {}", e);
            }
            self.transition(SessionState::Anonymous);
            return self.state();
        }

        self.transition(SessionState::Authenticating);

        match self.transport.authenticate(AuthRequest::Token { token }).await {
            Ok(grant) => {
                if let Err(e) = self.tokens.set(&grant.access_token) {
                    warn!("Failed to persist refreshed token: {}", e);
                }
                info!("Session restored for {}", grant.user.email);
                self.transition(SessionState::Authenticated(grant.user));
            }
            Err(e) if e.is_auth() => {
                info!("Persisted token rejected: {}", e);
                if let Err(e) = self.tokens.remove() {
                    warn!("Failed to remove rejected token: {}", e);
                }
                self.transition(SessionState::Anonymous);
            }
            Err(e) => {
                warn!("Session restore failed: {}", e);
                self.transition(SessionState::Anonymous);
            }
        }

        self.state()
    }

    /// Log in with credentials, or from the persisted token when omitted
    pub async fn login(&self, credentials: Option<Credentials>) -> ClientResult<User> {
        let Some(credentials) = credentials else {
            return match self.restore().await {
                SessionState::Authenticated(user) => Ok(user),
                _ => Err(ClientError::Auth {
                    reason: "No valid persisted token".to_string(),
                }),
            };
        };

        self.transition(SessionState::Authenticating);

        let request = AuthRequest::Password {
            email: credentials.email,
            password: credentials.password,
        };

        match self.transport.authenticate(request).await {
            Ok(grant) => {
                if let Err(e) = self.tokens.set(&grant.access_token) {
                    warn!("Failed to persist token: {}", e);
                }
                info!("Logged in as {}", grant.user.email);
                let user = grant.user.clone();
                self.transition(SessionState::Authenticated(grant.user));
                Ok(user)
            }
            Err(e) => {
                // The persisted token was not the cause here; keep it
                self.transition(SessionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Sign out: clear the persisted token and return to `Anonymous`
    ///
    /// Idempotent; calling while already `Anonymous` is a no-op success.
    /// Server-side invalidation is best effort and never blocks the local
    /// transition.
    pub async fn logout(&self) -> ClientResult<()> {
        if matches!(self.state(), SessionState::Anonymous) {
            return Ok(());
        }

        let removed = self.tokens.remove();

        if let Err(e) = self.transport.logout().await {
            debug!("Server-side logout failed: {}", e);
        }

        info!("Signed out");
        self.transition(SessionState::Anonymous);
        removed
    }

    /// Apply a state transition, notifying observers
    ///
    /// Re-asserting the current state is not a transition and emits
    /// nothing.
    fn transition(&self, next: SessionState) {
        if *self.state_rx.borrow() == next {
            return;
        }

        debug!("Session transition: {:?}", next);
        let _ = self.state_tx.send(next.clone());
        let _ = self.event_tx.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use crate::query::Query;
    use crate::token::MemoryTokenStore;
    use crate::transport::{AuthGrant, ConnectionStatus, CreatedEvent};

    /// Transport stub serving scripted authentication outcomes
    #[derive(Default)]
    struct ScriptedTransport {
        grants: Mutex<VecDeque<ClientResult<AuthGrant>>>,
        auth_calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn with_grants(grants: Vec<ClientResult<AuthGrant>>) -> Self {
            Self {
                grants: Mutex::new(grants.into()),
                ..Self::default()
            }
        }

        fn auth_calls(&self) -> usize {
            self.auth_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn authenticate(&self, _request: AuthRequest) -> ClientResult<AuthGrant> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            self.grants
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ClientError::NotConnected))
        }

        async fn logout(&self) -> ClientResult<()> {
            Ok(())
        }

        async fn find(&self, _collection: &str, _query: Query) -> ClientResult<Value> {
            Ok(serde_json::json!({"data": []}))
        }

        async fn create(&self, _collection: &str, record: Value) -> ClientResult<Value> {
            Ok(record)
        }

        fn subscribe_created(&self) -> broadcast::Receiver<CreatedEvent> {
            broadcast::channel(1).0.subscribe()
        }

        fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
            watch::channel(ConnectionStatus::Connected).1
        }

        async fn shutdown(&self) {}
    }

    fn grant_for(email: &str) -> AuthGrant {
        AuthGrant {
            access_token: "tok-1".to_string(),
            user: User::new(Uuid::new_v4(), email),
        }
    }

    fn manager(
        transport: ScriptedTransport,
        tokens: MemoryTokenStore,
    ) -> (SessionManager, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(tokens),
        );
        (session, transport)
    }

    #[tokio::test]
    async fn test_restore_without_token_stays_anonymous() {
        let (session, transport) =
            manager(ScriptedTransport::default(), MemoryTokenStore::new());

        let state = session.restore().await;

        assert_eq!(state, SessionState::Anonymous);
        assert_eq!(transport.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_restore_with_valid_token() {
        let (session, transport) = manager(
            ScriptedTransport::with_grants(vec![Ok(grant_for("alice@example.com"))]),
            MemoryTokenStore::with_token("old-token"),
        );

        let state = session.restore().await;

        assert!(state.is_authenticated());
        assert_eq!(state.user().unwrap().email, "alice@example.com");
        assert_eq!(transport.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_restore_persists_refreshed_token() {
        let tokens = Arc::new(MemoryTokenStore::with_token("old-token"));
        let transport = Arc::new(ScriptedTransport::with_grants(vec![Ok(grant_for(
            "alice@example.com",
        ))]));
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&tokens) as Arc<dyn TokenStore>,
        );

        session.restore().await;

        assert_eq!(tokens.get().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_restore_rejected_token_is_cleared() {
        let tokens = Arc::new(MemoryTokenStore::with_token("bad-token"));
        let transport = Arc::new(ScriptedTransport::with_grants(vec![Err(
            ClientError::Auth {
                reason: "jwt expired".to_string(),
            },
        )]));
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&tokens) as Arc<dyn TokenStore>,
        );

        let state = session.restore().await;

        assert_eq!(state, SessionState::Anonymous);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn test_restore_transport_failure_keeps_token() {
        let tokens = Arc::new(MemoryTokenStore::with_token("good-token"));
        let transport = Arc::new(ScriptedTransport::with_grants(vec![Err(
            ClientError::NotConnected,
        )]));
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&tokens) as Arc<dyn TokenStore>,
        );

        let state = session.restore().await;

        assert_eq!(state, SessionState::Anonymous);
        assert_eq!(tokens.get().as_deref(), Some("good-token"));
    }

    #[tokio::test]
    async fn test_login_success_emits_transitions_in_order() {
        let (mut session, _transport) = manager(
            ScriptedTransport::with_grants(vec![Ok(grant_for("alice@example.com"))]),
            MemoryTokenStore::new(),
        );
        let mut events = session.take_events().unwrap();

        let user = session
            .login(Some(Credentials::new("alice@example.com", "secret")))
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");

        assert_eq!(events.try_recv().unwrap(), SessionState::Authenticating);
        assert!(matches!(
            events.try_recv().unwrap(),
            SessionState::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_login_failure_sets_failed_state() {
        let (session, _) = manager(
            ScriptedTransport::with_grants(vec![Err(ClientError::Auth {
                reason: "Invalid login".to_string(),
            })]),
            MemoryTokenStore::new(),
        );

        let err = session
            .login(Some(Credentials::new("alice@example.com", "wrong")))
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_login_failure_keeps_persisted_token() {
        let tokens = Arc::new(MemoryTokenStore::with_token("tok-keep"));
        let transport = Arc::new(ScriptedTransport::with_grants(vec![Err(
            ClientError::Auth {
                reason: "Invalid login".to_string(),
            },
        )]));
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&tokens) as Arc<dyn TokenStore>,
        );

        let _ = session
            .login(Some(Credentials::new("alice@example.com", "wrong")))
            .await;

        // Bad credentials were the cause, not the token
        assert_eq!(tokens.get().as_deref(), Some("tok-keep"));
    }

    #[tokio::test]
    async fn test_login_without_credentials_uses_restore() {
        let (session, transport) =
            manager(ScriptedTransport::default(), MemoryTokenStore::new());

        let err = session.login(None).await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(transport.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_token_and_state() {
        let tokens = Arc::new(MemoryTokenStore::new());
        let transport = Arc::new(ScriptedTransport::with_grants(vec![Ok(grant_for(
            "alice@example.com",
        ))]));
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&tokens) as Arc<dyn TokenStore>,
        );

        session
            .login(Some(Credentials::new("alice@example.com", "secret")))
            .await
            .unwrap();
        assert!(tokens.get().is_some());

        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_while_anonymous_is_noop() {
        let (mut session, _) =
            manager(ScriptedTransport::default(), MemoryTokenStore::new());
        let mut events = session.take_events().unwrap();

        session.logout().await.unwrap();

        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(events.try_recv().is_err());
    }
}
