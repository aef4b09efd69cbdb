// Copyright (c) 2025 - Cowboy AI, Inc.
//! Persistent Subscriptions
//!
//! A persistent subscription is a durable, named consumer group on a stream
//! of the event log. Several connections to the same group compete for its
//! messages; the log tracks acknowledgements and redelivers what was not
//! acknowledged.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── SubscriptionWorker ─────────────┐
//! Catalog ──poll──► get_new_subscriptions(all, running, filters) │
//!                 │        │ start                               │
//!                 │        ▼                                     │
//!                 │  PersistentSubscription ◄── drop ── removes  │
//!                 └────────┼──────────────────────── itself ─────┘
//!                          │ connect
//!                          ▼
//!                 SubscriptionClient ──► MessageStream
//!                          │
//!       decode (DomainEventFactory) → resolve (EventHandlerResolver)
//!                          → dispatch_to_handlers → ack / nack
//! ```
//!
//! The [`SubscriptionClient`] and [`SubscriptionCatalog`] ports have an
//! in-memory implementation ([`memory`]) and a NATS JetStream one ([`nats`]),
//! where a group is a durable pull consumer.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::events::RecordedEvent;

pub mod config;
pub mod lifecycle;
pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;
pub mod persistent;
pub mod worker;

pub use config::{SubscriptionWorkerConfig, WorkerPool};
pub use lifecycle::{ConnectionInput, ConnectionState};
pub use memory::{InMemorySubscriptionClient, StaticSubscriptionCatalog};
#[cfg(feature = "nats")]
pub use nats::{NatsSubscriptionCatalog, NatsSubscriptionClient};
pub use persistent::{MessageDispatcher, PersistentSubscription, RunningSubscriptions};
pub use worker::{get_new_subscriptions, SubscriptionWorker};

/// Descriptor of a persistent subscription group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistentSubscriptionInfo {
    /// Stream (or stream selector) the group reads
    pub stream_name: String,

    /// Consumer group name
    pub group_name: String,

    /// Deliveries after which the log parks a message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_count: Option<u32>,
}

impl PersistentSubscriptionInfo {
    pub fn new(stream_name: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            group_name: group_name.into(),
            max_retry_count: None,
        }
    }

    pub fn with_max_retry_count(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = Some(max_retry_count);
        self
    }

    /// Identity of the subscription (stream + group)
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            stream_name: self.stream_name.clone(),
            group_name: self.group_name.clone(),
        }
    }
}

/// Stream + group identity of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub stream_name: String,
    pub group_name: String,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.stream_name, self.group_name)
    }
}

/// Per-connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Maximum number of unacknowledged messages pushed to this connection
    pub inflight_messages: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            inflight_messages: config::DEFAULT_INFLIGHT_MESSAGES,
        }
    }
}

/// Errors raised by subscription ports
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// Could not connect to the group
    #[error("Subscription connect error: {0}")]
    Connect(String),

    /// The connection was lost
    #[error("Subscription dropped: {0}")]
    Dropped(String),

    /// An ack or nack could not be delivered
    #[error("Subscription ack error: {0}")]
    Ack(String),

    /// The catalog could not be read
    #[error("Subscription catalog error: {0}")]
    Catalog(String),
}

/// How a negatively acknowledged message is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackAction {
    /// Redeliver later, counting toward the retry limit
    Retry,
    /// Never redeliver (poison message)
    Park,
}

/// Acknowledgement handle of one delivered message
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), SubscriptionError>;

    async fn nack(&self, action: NackAction, reason: &str) -> Result<(), SubscriptionError>;
}

/// One message delivered by a subscription client
pub struct SubscriptionMessage {
    /// The raw log record
    pub record: RecordedEvent,

    /// Number of earlier deliveries of this message
    pub retry_count: u32,

    acknowledger: Box<dyn Acknowledger>,
}

impl SubscriptionMessage {
    pub fn new(record: RecordedEvent, retry_count: u32, acknowledger: Box<dyn Acknowledger>) -> Self {
        Self {
            record,
            retry_count,
            acknowledger,
        }
    }

    pub async fn ack(&self) -> Result<(), SubscriptionError> {
        self.acknowledger.ack().await
    }

    pub async fn nack(&self, action: NackAction, reason: &str) -> Result<(), SubscriptionError> {
        self.acknowledger.nack(action, reason).await
    }
}

impl fmt::Debug for SubscriptionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionMessage")
            .field("record", &self.record)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

/// Messages of one connection
///
/// An `Err` item or the end of the stream means the connection dropped.
pub type MessageStream = BoxStream<'static, Result<SubscriptionMessage, SubscriptionError>>;

/// Connects to persistent subscription groups
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    async fn connect(
        &self,
        info: &PersistentSubscriptionInfo,
        settings: ConnectionSettings,
    ) -> Result<MessageStream, SubscriptionError>;
}

/// Lists the persistent subscription groups defined on the log
#[async_trait]
pub trait SubscriptionCatalog: Send + Sync {
    /// All currently defined groups; `use_cache` allows a recently fetched answer
    async fn get_subscriptions(&self, use_cache: bool) -> Result<Vec<PersistentSubscriptionInfo>, SubscriptionError>;
}
