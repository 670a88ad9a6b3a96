//! Resource feeds
//!
//! A feed wraps one remote collection: paginated reads, creates, and a
//! live subscription to creation events. The feed never reorders events
//! and makes no promise about a `created` event arriving before or after
//! a `find` response it races; reconciling the two is the sync core's job.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::models::{Message, User};
use crate::query::{Page, Query};
use crate::transport::{CreatedEvent, Transport};

/// A record type served by a resource feed
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Server collection name
    const COLLECTION: &'static str;

    /// Unique id within the collection
    fn id(&self) -> Uuid;
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Message {
    const COLLECTION: &'static str = "messages";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// A remote collection of records of type `R`
pub struct Feed<R: Record> {
    transport: Arc<dyn Transport>,
    subscribed: Arc<AtomicBool>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for Feed<R> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            subscribed: Arc::clone(&self.subscribed),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Feed<R> {
    /// Create a feed over the given transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            subscribed: Arc::new(AtomicBool::new(false)),
            _record: PhantomData,
        }
    }

    /// Fetch a page of records matching the query
    pub async fn find(&self, query: Query) -> ClientResult<Page<R>> {
        let data = self.transport.find(R::COLLECTION, query).await?;
        serde_json::from_value(data).map_err(|e| {
            ClientError::Protocol(format!("malformed {} page: {}", R::COLLECTION, e))
        })
    }

    /// Submit a creation payload; resolves with the canonical record
    pub async fn create<P: Serialize + Sync>(&self, payload: &P) -> ClientResult<R> {
        let record = serde_json::to_value(payload)?;
        let created = self.transport.create(R::COLLECTION, record).await?;
        serde_json::from_value(created).map_err(|e| {
            ClientError::Protocol(format!("malformed {} record: {}", R::COLLECTION, e))
        })
    }

    /// Subscribe to creation events for this collection
    ///
    /// At most one subscription per feed may be active; re-subscribing
    /// after the previous subscription was dropped is allowed.
    pub fn subscribe_created(&self) -> ClientResult<CreatedSubscription<R>> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadySubscribed {
                collection: R::COLLECTION.to_string(),
            });
        }

        Ok(CreatedSubscription {
            rx: self.transport.subscribe_created(),
            active: Arc::clone(&self.subscribed),
            _record: PhantomData,
        })
    }
}

/// An active subscription to a feed's creation events
///
/// Pull-based: events are delivered only through [`recv`], so once the
/// subscription is dropped no further event can reach the holder.
///
/// [`recv`]: CreatedSubscription::recv
#[derive(Debug)]
pub struct CreatedSubscription<R: Record> {
    rx: broadcast::Receiver<CreatedEvent>,
    active: Arc<AtomicBool>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> CreatedSubscription<R> {
    /// Receive the next creation for this collection
    ///
    /// Returns `None` once the transport has shut down.
    pub async fn recv(&mut self) -> Option<R> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.collection == R::COLLECTION => {
                    match serde_json::from_value(event.record) {
                        Ok(record) => return Some(record),
                        Err(e) => {
                            warn!("Dropping malformed {} event: {}", R::COLLECTION, e);
                        }
                    }
                }
                Ok(_) => {
                    // Another collection's event
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Created stream lagged, {} {} events skipped", n, R::COLLECTION);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription, allowing a later re-subscribe
    pub fn unsubscribe(self) {}
}

impl<R: Record> Drop for CreatedSubscription<R> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
