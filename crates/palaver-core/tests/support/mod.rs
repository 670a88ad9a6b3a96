//! Shared test support: a scripted transport and a recording presenter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch, Semaphore};
use uuid::Uuid;

use palaver_core::transport::{AuthGrant, AuthRequest, ConnectionStatus, CreatedEvent, Transport};
use palaver_core::{ClientResult, Message, Presenter, Query, User};

/// Scripted in-memory transport
///
/// Tests queue authentication grants and find pages, push created events,
/// and flip the connection status. Find calls can be gated behind a
/// semaphore to open a deterministic race window during bootstrap.
pub struct MockTransport {
    grants: Mutex<VecDeque<ClientResult<AuthGrant>>>,
    pages: Mutex<HashMap<String, VecDeque<ClientResult<Value>>>>,
    find_counts: Mutex<HashMap<String, usize>>,
    find_gate: Mutex<Option<Arc<Semaphore>>>,
    created_tx: broadcast::Sender<CreatedEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (created_tx, _) = broadcast::channel(64);
        let (status_tx, _) = watch::channel(ConnectionStatus::Connected);
        Self {
            grants: Mutex::new(VecDeque::new()),
            pages: Mutex::new(HashMap::new()),
            find_counts: Mutex::new(HashMap::new()),
            find_gate: Mutex::new(None),
            created_tx,
            status_tx,
        }
    }

    /// Queue the outcome of the next authenticate call
    pub fn queue_grant(&self, grant: ClientResult<AuthGrant>) {
        self.grants.lock().unwrap().push_back(grant);
    }

    /// Queue the outcome of the next find on a collection
    pub fn queue_page(&self, collection: &str, page: ClientResult<Value>) {
        self.pages
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push_back(page);
    }

    /// Push a created event to all subscribers
    pub fn push_created(&self, collection: &str, record: Value) {
        let _ = self.created_tx.send(CreatedEvent {
            collection: collection.to_string(),
            record,
        });
    }

    /// Flip the connection status
    pub fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status_tx.send(status);
    }

    /// Make every find wait for a semaphore permit
    pub fn gate_finds(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.find_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Number of find calls issued against a collection
    pub fn find_count(&self, collection: &str) -> usize {
        *self
            .find_counts
            .lock()
            .unwrap()
            .get(collection)
            .unwrap_or(&0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn authenticate(&self, _request: AuthRequest) -> ClientResult<AuthGrant> {
        self.grants
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(grant_for("user@example.com")))
    }

    async fn logout(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn find(&self, collection: &str, _query: Query) -> ClientResult<Value> {
        *self
            .find_counts
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_insert(0) += 1;

        let gate = self.find_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.pages
            .lock()
            .unwrap()
            .get_mut(collection)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(json!({"data": []})))
    }

    async fn create(&self, collection: &str, record: Value) -> ClientResult<Value> {
        // Assign the server-side canonical fields
        match collection {
            "messages" => Ok(json!({
                "id": Uuid::new_v4(),
                "text": record["text"],
                "createdAt": Utc::now().to_rfc3339(),
                "userId": Uuid::new_v4(),
            })),
            _ => Ok(json!({
                "id": Uuid::new_v4(),
                "email": record["email"],
            })),
        }
    }

    fn subscribe_created(&self) -> broadcast::Receiver<CreatedEvent> {
        self.created_tx.subscribe()
    }

    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    async fn shutdown(&self) {
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }
}

/// A default grant for the given email
pub fn grant_for(email: &str) -> AuthGrant {
    AuthGrant {
        access_token: "test-token".to_string(),
        user: User::new(Uuid::new_v4(), email),
    }
}

/// A message record as the server would serialize it
pub fn message_json(id: Uuid, text: &str, secs: i64) -> Value {
    json!({
        "id": id,
        "text": text,
        "createdAt": Utc.timestamp_opt(secs, 0).unwrap().to_rfc3339(),
        "userId": Uuid::from_u128(1),
    })
}

/// A user record as the server would serialize it
pub fn user_json(id: Uuid, email: &str) -> Value {
    json!({"id": id, "email": email})
}

/// A find result page wrapping the given records
pub fn page_of(records: Vec<Value>) -> ClientResult<Value> {
    Ok(json!({ "data": records }))
}

/// Everything the presenter was told, shared with the test
#[derive(Default)]
pub struct PresenterLog {
    pub messages: Vec<Message>,
    pub users: Vec<User>,
    pub cleared: usize,
    pub errors: Vec<String>,
    /// Messages rendered since the last clear
    pub since_clear: Vec<Message>,
}

/// Presenter that records every call for later assertions
#[derive(Clone, Default)]
pub struct RecordingPresenter {
    log: Arc<Mutex<PresenterLog>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered_texts(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.log.lock().unwrap().messages.len()
    }

    pub fn count_of(&self, id: Uuid) -> usize {
        self.log
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.id == id)
            .count()
    }

    pub fn user_count(&self) -> usize {
        self.log.lock().unwrap().users.len()
    }

    pub fn cleared_count(&self) -> usize {
        self.log.lock().unwrap().cleared
    }

    pub fn error_count(&self) -> usize {
        self.log.lock().unwrap().errors.len()
    }

    pub fn texts_since_clear(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .since_clear
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn on_user_added(&mut self, user: &User) {
        self.log.lock().unwrap().users.push(user.clone());
    }

    fn on_message_added(&mut self, message: &Message) {
        let mut log = self.log.lock().unwrap();
        log.messages.push(message.clone());
        log.since_clear.push(message.clone());
    }

    fn on_session_cleared(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.cleared += 1;
        log.since_clear.clear();
    }

    fn on_session_error(&mut self, reason: &str) {
        self.log.lock().unwrap().errors.push(reason.to_string());
    }
}

/// Poll until the condition holds, failing the test after two seconds
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Duration::from_secs(2);
    let poll = async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    if tokio::time::timeout(deadline, poll).await.is_err() {
        panic!("timed out waiting for: {}", what);
    }
}
