//! Synchronization core
//!
//! Reconciles the initial snapshot fetch with the unbounded stream of live
//! creation events and drives the Presenter. State machine:
//!
//! `Idle -> Bootstrapping -> Live -> TornDown`
//!
//! Bootstrapping attaches the live subscriptions first, then fetches the
//! snapshot pages, so any creation racing the snapshot is covered by the
//! id-based dedup when it is replayed. A connection drop while live
//! re-bootstraps against the existing views: already-rendered history
//! survives and only unseen records are forwarded.

use std::collections::HashSet;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClientResult;
use crate::feed::{CreatedSubscription, Feed};
use crate::models::{Message, User};
use crate::presenter::Presenter;
use crate::query::Query;
use crate::session::SessionState;
use crate::transport::ConnectionStatus;

/// Sort field for the message history page
const MESSAGE_SORT_FIELD: &str = "createdAt";

/// Sync state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No session; waiting for authentication
    Idle,
    /// Initial snapshot fetch in flight
    Bootstrapping,
    /// Snapshot rendered, live events flowing
    Live,
    /// Session ended, views discarded
    TornDown,
}

/// Locally owned projections of the remote collections
///
/// Messages are kept chronological (`created_at` ascending, ties broken by
/// id); users keep arrival order. The id sets double as the dedup record
/// for the bootstrap race and reconnect merges.
#[derive(Debug, Default)]
pub struct LocalViews {
    messages: Vec<Message>,
    message_ids: HashSet<Uuid>,
    users: Vec<User>,
    user_ids: HashSet<Uuid>,
}

impl LocalViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message in chronological position
    ///
    /// Returns false (and changes nothing) if the id is already present.
    pub fn insert_message(&mut self, message: Message) -> bool {
        if !self.message_ids.insert(message.id) {
            return false;
        }

        let key = message.sort_key();
        let idx = self.messages.partition_point(|m| m.sort_key() <= key);
        self.messages.insert(idx, message);
        true
    }

    /// Insert a user
    ///
    /// Returns false (and changes nothing) if the id is already present.
    pub fn insert_user(&mut self, user: User) -> bool {
        if !self.user_ids.insert(user.id) {
            return false;
        }

        self.users.push(user);
        true
    }

    /// Messages in chronological order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Users in arrival order
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.users.is_empty()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.messages.clear();
        self.message_ids.clear();
        self.users.clear();
        self.user_ids.clear();
    }
}

/// Why the live loop ended
enum LiveExit {
    SignedOut,
    Failed(String),
    Reauthenticated,
    ConnectionLost,
    Shutdown,
}

/// Why a session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionOutcome {
    Ended,
    Shutdown,
}

/// The synchronization orchestrator
///
/// Owns the local views; nothing else mutates them. Driven by the session
/// transition channel and the transport status watch.
pub struct SyncCore<P: Presenter> {
    users: Feed<User>,
    messages: Feed<Message>,
    presenter: P,
    page_size: u32,
    phase: SyncPhase,
    views: LocalViews,
}

impl<P: Presenter> std::fmt::Debug for SyncCore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCore")
            .field("page_size", &self.page_size)
            .field("phase", &self.phase)
            .field("views", &self.views)
            .finish_non_exhaustive()
    }
}

impl<P: Presenter> SyncCore<P> {
    pub fn new(users: Feed<User>, messages: Feed<Message>, presenter: P, page_size: u32) -> Self {
        Self {
            users,
            messages,
            presenter,
            page_size,
            phase: SyncPhase::Idle,
            views: LocalViews::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The local views
    pub fn views(&self) -> &LocalViews {
        &self.views
    }

    /// The presenter
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Consume the core, returning its presenter
    pub fn into_presenter(self) -> P {
        self.presenter
    }

    /// Run until the session channel closes
    ///
    /// Returns the core so callers can inspect the final views and
    /// presenter.
    pub async fn run(
        mut self,
        mut sessions: mpsc::UnboundedReceiver<SessionState>,
        mut status: watch::Receiver<ConnectionStatus>,
    ) -> Self {
        loop {
            // Idle: wait for an authenticated session
            let Some(state) = sessions.recv().await else {
                break;
            };

            match state {
                SessionState::Authenticated(user) => {
                    debug!("Session established for {}", user.email);
                }
                SessionState::Failed(reason) => {
                    self.presenter.on_session_error(&reason);
                    continue;
                }
                SessionState::Anonymous | SessionState::Authenticating => continue,
            }

            if self.run_session(&mut sessions, &mut status).await == SessionOutcome::Shutdown {
                break;
            }

            self.phase = SyncPhase::Idle;
        }

        self
    }

    /// Drive one authenticated session: bootstrap, live, reconnect cycles
    async fn run_session(
        &mut self,
        sessions: &mut mpsc::UnboundedReceiver<SessionState>,
        status: &mut watch::Receiver<ConnectionStatus>,
    ) -> SessionOutcome {
        let mut resync = false;

        loop {
            match self.bootstrap(resync).await {
                Ok((message_sub, user_sub)) => {
                    match self.live(message_sub, user_sub, sessions, status).await {
                        LiveExit::SignedOut => {
                            self.teardown();
                            return SessionOutcome::Ended;
                        }
                        LiveExit::Failed(reason) => {
                            self.teardown();
                            self.presenter.on_session_error(&reason);
                            return SessionOutcome::Ended;
                        }
                        LiveExit::Reauthenticated => {
                            self.teardown();
                            resync = false;
                        }
                        LiveExit::ConnectionLost => {
                            warn!("Live connection lost, waiting to reconnect");
                            match self.await_reconnect(sessions, status).await {
                                WaitOutcome::Reconnected => resync = true,
                                WaitOutcome::SignedOut => {
                                    self.teardown();
                                    return SessionOutcome::Ended;
                                }
                                WaitOutcome::Failed(reason) => {
                                    self.teardown();
                                    self.presenter.on_session_error(&reason);
                                    return SessionOutcome::Ended;
                                }
                                WaitOutcome::Reauthenticated => {
                                    self.teardown();
                                    resync = false;
                                }
                                WaitOutcome::Shutdown => return SessionOutcome::Shutdown,
                            }
                        }
                        LiveExit::Shutdown => return SessionOutcome::Shutdown,
                    }
                }
                Err(e) if e.is_retryable() && resync => {
                    // Server still unreachable; keep the rendered history
                    // and wait for the next reconnect
                    debug!("Re-bootstrap failed: {}", e);
                    match self.await_reconnect(sessions, status).await {
                        WaitOutcome::Reconnected => {}
                        WaitOutcome::SignedOut => {
                            self.teardown();
                            return SessionOutcome::Ended;
                        }
                        WaitOutcome::Failed(reason) => {
                            self.teardown();
                            self.presenter.on_session_error(&reason);
                            return SessionOutcome::Ended;
                        }
                        WaitOutcome::Reauthenticated => {
                            self.teardown();
                            resync = false;
                        }
                        WaitOutcome::Shutdown => return SessionOutcome::Shutdown,
                    }
                }
                Err(e) => {
                    // A failed bootstrap must not leave a partial chat view;
                    // surface it as a session-level failure
                    warn!("Bootstrap failed: {}", e);
                    if resync {
                        self.teardown();
                    } else {
                        self.views.clear();
                        self.phase = SyncPhase::TornDown;
                    }
                    self.presenter.on_session_error(&e.to_string());
                    return SessionOutcome::Ended;
                }
            }
        }
    }

    /// Fetch the snapshot and attach the live subscriptions
    ///
    /// On a resync the existing views are kept; dedup suppresses the
    /// overlap between the re-fetched snapshot and rendered history.
    async fn bootstrap(
        &mut self,
        resync: bool,
    ) -> ClientResult<(CreatedSubscription<Message>, CreatedSubscription<User>)> {
        self.phase = SyncPhase::Bootstrapping;
        info!(
            "Bootstrapping{}",
            if resync { " after reconnect" } else { "" }
        );

        // Attach before fetching: an event racing the snapshot is then
        // buffered and deduplicated instead of lost
        let message_sub = self.messages.subscribe_created()?;
        let user_sub = self.users.subscribe_created()?;

        let (users_page, messages_page) = tokio::try_join!(
            self.users.find(Query::all()),
            self.messages
                .find(Query::latest(MESSAGE_SORT_FIELD, self.page_size)),
        )?;

        // The history page arrives newest-first and truncated; order it
        // chronologically before presenting
        let mut history = messages_page.data;
        history.sort_by_key(Message::sort_key);

        for user in users_page.data {
            self.add_user(user);
        }
        for message in history {
            self.add_message(message);
        }

        self.phase = SyncPhase::Live;
        info!(
            "Live with {} users, {} messages",
            self.views.users().len(),
            self.views.messages().len()
        );

        Ok((message_sub, user_sub))
    }

    /// Forward live events until the session or the connection ends
    async fn live(
        &mut self,
        mut message_sub: CreatedSubscription<Message>,
        mut user_sub: CreatedSubscription<User>,
        sessions: &mut mpsc::UnboundedReceiver<SessionState>,
        status: &mut watch::Receiver<ConnectionStatus>,
    ) -> LiveExit {
        loop {
            tokio::select! {
                state = sessions.recv() => {
                    match state {
                        None => return LiveExit::Shutdown,
                        Some(SessionState::Anonymous) => return LiveExit::SignedOut,
                        Some(SessionState::Failed(reason)) => return LiveExit::Failed(reason),
                        Some(SessionState::Authenticated(_)) => return LiveExit::Reauthenticated,
                        Some(SessionState::Authenticating) => {}
                    }
                }

                message = message_sub.recv() => {
                    match message {
                        Some(message) => self.add_message(message),
                        None => return LiveExit::ConnectionLost,
                    }
                }

                user = user_sub.recv() => {
                    match user {
                        Some(user) => self.add_user(user),
                        None => return LiveExit::ConnectionLost,
                    }
                }

                changed = status.changed() => {
                    if changed.is_err() {
                        return LiveExit::ConnectionLost;
                    }
                    if *status.borrow() == ConnectionStatus::Disconnected {
                        return LiveExit::ConnectionLost;
                    }
                }
            }
        }
    }

    /// Wait for the transport to come back, still honoring session events
    async fn await_reconnect(
        &mut self,
        sessions: &mut mpsc::UnboundedReceiver<SessionState>,
        status: &mut watch::Receiver<ConnectionStatus>,
    ) -> WaitOutcome {
        loop {
            if *status.borrow_and_update() == ConnectionStatus::Connected {
                return WaitOutcome::Reconnected;
            }

            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        return WaitOutcome::Shutdown;
                    }
                }

                state = sessions.recv() => {
                    match state {
                        None => return WaitOutcome::Shutdown,
                        Some(SessionState::Anonymous) => return WaitOutcome::SignedOut,
                        Some(SessionState::Failed(reason)) => return WaitOutcome::Failed(reason),
                        Some(SessionState::Authenticated(_)) => return WaitOutcome::Reauthenticated,
                        Some(SessionState::Authenticating) => {}
                    }
                }
            }
        }
    }

    /// End the session: views are discarded only after the subscriptions
    /// were dropped, so no in-flight event can touch them
    fn teardown(&mut self) {
        self.views.clear();
        self.presenter.on_session_cleared();
        self.phase = SyncPhase::TornDown;
        info!("Session torn down");
    }

    fn add_message(&mut self, message: Message) {
        if self.views.insert_message(message.clone()) {
            self.presenter.on_message_added(&message);
        } else {
            debug!("Suppressing duplicate message {}", message.id);
        }
    }

    fn add_user(&mut self, user: User) {
        if self.views.insert_user(user.clone()) {
            self.presenter.on_user_added(&user);
        } else {
            debug!("Suppressing duplicate user {}", user.id);
        }
    }
}

/// Why a reconnect wait ended
enum WaitOutcome {
    Reconnected,
    SignedOut,
    Failed(String),
    Reauthenticated,
    Shutdown,
}
