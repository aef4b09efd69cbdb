// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory subscription ports
//!
//! [`InMemorySubscriptionClient`] delivers published records to every group
//! connected on the record's stream, round-robin across the competing
//! connections of a group. Nacked messages are redelivered until the group's
//! retry limit is reached and then parked. Records published while a group
//! has no connection are not buffered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::events::RecordedEvent;
use crate::subscription::{
    Acknowledger, ConnectionSettings, MessageStream, NackAction, PersistentSubscriptionInfo, SubscriptionCatalog,
    SubscriptionClient, SubscriptionError, SubscriptionKey, SubscriptionMessage,
};

/// Retry limit of groups that do not set one
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 10;

type Delivery = Result<SubscriptionMessage, SubscriptionError>;

#[derive(Debug)]
struct Connection {
    sender: mpsc::UnboundedSender<Delivery>,
    settings: ConnectionSettings,
}

#[derive(Debug, Default)]
struct Group {
    max_retry_count: u32,
    connections: Vec<Connection>,
    next: usize,
    connects: usize,
}

#[derive(Debug, Default)]
struct Inner {
    groups: HashMap<SubscriptionKey, Group>,
    acked: Vec<Uuid>,
    retried: Vec<Uuid>,
    parked: Vec<(Uuid, String)>,
    refuse_connections: bool,
}

/// Subscription client backed by in-process channels
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionClient {
    inner: Arc<RwLock<Inner>>,
}

impl InMemorySubscriptionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a record to every group connected on `record.stream_id`
    ///
    /// Returns the number of groups that received it.
    pub async fn publish(&self, record: RecordedEvent) -> usize {
        let stream_name = record.stream_id.clone();
        self.publish_to(&stream_name, record).await
    }

    /// Deliver a record to every group connected on `stream_name`
    pub async fn publish_to(&self, stream_name: &str, record: RecordedEvent) -> usize {
        let mut inner = self.inner.write().await;

        let keys: Vec<SubscriptionKey> = inner
            .groups
            .keys()
            .filter(|key| key.stream_name == stream_name)
            .cloned()
            .collect();

        let mut delivered = 0;
        for key in keys {
            if self.deliver(&mut inner, &key, record.clone(), 0) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop every connection of a group
    ///
    /// Each connection receives a `Dropped` error as its last item.
    pub async fn drop_connections(&self, key: &SubscriptionKey, reason: &str) -> usize {
        let mut inner = self.inner.write().await;

        let Some(group) = inner.groups.get_mut(key) else {
            return 0;
        };

        let connections: Vec<Connection> = group.connections.drain(..).collect();
        for connection in &connections {
            let _ = connection
                .sender
                .send(Err(SubscriptionError::Dropped(reason.to_string())));
        }
        connections.len()
    }

    /// Make subsequent connects fail
    pub async fn refuse_connections(&self, refuse: bool) {
        self.inner.write().await.refuse_connections = refuse;
    }

    /// Live connections of a group
    pub async fn connection_count(&self, key: &SubscriptionKey) -> usize {
        self.inner
            .read()
            .await
            .groups
            .get(key)
            .map(|group| group.connections.iter().filter(|c| !c.sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// Successful connects to a group since creation
    pub async fn connect_count(&self, key: &SubscriptionKey) -> usize {
        self.inner.read().await.groups.get(key).map(|group| group.connects).unwrap_or(0)
    }

    /// Inflight window requested by the connections of a group
    pub async fn requested_inflight(&self, key: &SubscriptionKey) -> Vec<usize> {
        self.inner
            .read()
            .await
            .groups
            .get(key)
            .map(|group| group.connections.iter().map(|c| c.settings.inflight_messages).collect())
            .unwrap_or_default()
    }

    /// Event IDs acknowledged so far, in order
    pub async fn acked(&self) -> Vec<Uuid> {
        self.inner.read().await.acked.clone()
    }

    /// Event IDs nacked for retry so far, in order
    pub async fn retried(&self) -> Vec<Uuid> {
        self.inner.read().await.retried.clone()
    }

    /// Event IDs parked so far, with the reason
    pub async fn parked(&self) -> Vec<(Uuid, String)> {
        self.inner.read().await.parked.clone()
    }

    fn deliver(&self, inner: &mut Inner, key: &SubscriptionKey, record: RecordedEvent, retry_count: u32) -> bool {
        let Some(group) = inner.groups.get_mut(key) else {
            return false;
        };

        group.connections.retain(|connection| !connection.sender.is_closed());
        if group.connections.is_empty() {
            return false;
        }

        let index = group.next % group.connections.len();
        group.next = group.next.wrapping_add(1);

        let acknowledger = MemoryAcknowledger {
            client: self.clone(),
            key: key.clone(),
            record: record.clone(),
            retry_count,
            max_retry_count: group.max_retry_count,
        };
        let message = SubscriptionMessage::new(record, retry_count, Box::new(acknowledger));

        group.connections[index].sender.send(Ok(message)).is_ok()
    }
}

#[async_trait]
impl SubscriptionClient for InMemorySubscriptionClient {
    async fn connect(
        &self,
        info: &PersistentSubscriptionInfo,
        settings: ConnectionSettings,
    ) -> Result<MessageStream, SubscriptionError> {
        let mut inner = self.inner.write().await;

        if inner.refuse_connections {
            return Err(SubscriptionError::Connect(format!(
                "connection to {} refused",
                info.key()
            )));
        }

        let (sender, receiver) = mpsc::unbounded_channel();

        let group = inner.groups.entry(info.key()).or_default();
        group.max_retry_count = info.max_retry_count.unwrap_or(DEFAULT_MAX_RETRY_COUNT);
        group.connections.push(Connection { sender, settings });
        group.connects += 1;

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }
}

struct MemoryAcknowledger {
    client: InMemorySubscriptionClient,
    key: SubscriptionKey,
    record: RecordedEvent,
    retry_count: u32,
    max_retry_count: u32,
}

#[async_trait]
impl Acknowledger for MemoryAcknowledger {
    async fn ack(&self) -> Result<(), SubscriptionError> {
        self.client.inner.write().await.acked.push(self.record.event_id);
        Ok(())
    }

    async fn nack(&self, action: NackAction, reason: &str) -> Result<(), SubscriptionError> {
        let mut inner = self.client.inner.write().await;

        if action == NackAction::Park || self.retry_count >= self.max_retry_count {
            inner.parked.push((self.record.event_id, reason.to_string()));
            return Ok(());
        }

        inner.retried.push(self.record.event_id);
        self.client
            .deliver(&mut inner, &self.key, self.record.clone(), self.retry_count + 1);
        Ok(())
    }
}

/// Catalog over a fixed, replaceable list of groups
#[derive(Debug, Default)]
pub struct StaticSubscriptionCatalog {
    subscriptions: RwLock<Vec<PersistentSubscriptionInfo>>,
    requests: AtomicUsize,
}

impl StaticSubscriptionCatalog {
    pub fn new(subscriptions: Vec<PersistentSubscriptionInfo>) -> Self {
        Self {
            subscriptions: RwLock::new(subscriptions),
            requests: AtomicUsize::new(0),
        }
    }

    pub async fn set(&self, subscriptions: Vec<PersistentSubscriptionInfo>) {
        *self.subscriptions.write().await = subscriptions;
    }

    pub async fn add(&self, info: PersistentSubscriptionInfo) {
        self.subscriptions.write().await.push(info);
    }

    /// Number of `get_subscriptions` calls served
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionCatalog for StaticSubscriptionCatalog {
    async fn get_subscriptions(&self, _use_cache: bool) -> Result<Vec<PersistentSubscriptionInfo>, SubscriptionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.subscriptions.read().await.clone())
    }
}
