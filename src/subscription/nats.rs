// Copyright (c) 2025 - Cowboy AI, Inc.
//! JetStream subscription ports
//!
//! A persistent subscription group is a durable pull consumer on the event
//! log stream. The consumer's filter subject selects the stream (see
//! [`SubjectBuilder::subscription_filter`]) and its description carries the
//! `"{stream}::{group}"` identity so the catalog can list groups back.
//!
//! | Subscription concept | JetStream                         |
//! |----------------------|-----------------------------------|
//! | inflight window      | `max_ack_pending`                 |
//! | max retry count      | `max_deliver` (retries + 1)       |
//! | nack for retry       | `AckKind::Nak`                    |
//! | park                 | `AckKind::Term`                   |

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::event_store::NatsEventLog;
use crate::jetstream::StoredRecord;
use crate::subjects::SubjectBuilder;
use crate::subscription::{
    Acknowledger, ConnectionSettings, MessageStream, NackAction, PersistentSubscriptionInfo, SubscriptionCatalog,
    SubscriptionClient, SubscriptionError, SubscriptionMessage,
};

/// How long an unacknowledged message stays with one connection
const ACK_WAIT: Duration = Duration::from_secs(30);

/// Messages requested per pull
const MAX_BATCH: usize = 100;

/// How long a catalog answer may be served from cache
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(30);

/// Durable consumer name of a group
///
/// JetStream consumer names are unique per stream, so the stream is part of it.
pub fn consumer_name(info: &PersistentSubscriptionInfo) -> String {
    format!("{}_{}", info.group_name, info.stream_name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn consumer_config(
    info: &PersistentSubscriptionInfo,
    subjects: &SubjectBuilder,
    settings: ConnectionSettings,
) -> pull::Config {
    let name = consumer_name(info);

    pull::Config {
        durable_name: Some(name.clone()),
        name: Some(name),
        description: Some(info.key().to_string()),
        filter_subject: subjects.subscription_filter(&info.stream_name),
        ack_policy: jetstream::consumer::AckPolicy::Explicit,
        ack_wait: ACK_WAIT,
        max_ack_pending: settings.inflight_messages as i64,
        max_deliver: info.max_retry_count.map(|n| i64::from(n) + 1).unwrap_or(-1),
        deliver_policy: jetstream::consumer::DeliverPolicy::All,
        ..Default::default()
    }
}

/// Group identity stored in a consumer description
fn parse_description(description: &str) -> Option<(&str, &str)> {
    description
        .split_once("::")
        .filter(|(stream, group)| !stream.is_empty() && !group.is_empty())
}

/// Connects persistent subscriptions to durable JetStream consumers
#[derive(Clone)]
pub struct NatsSubscriptionClient {
    jetstream: jetstream::Context,
    stream_name: String,
    subjects: SubjectBuilder,
}

impl NatsSubscriptionClient {
    pub fn new(jetstream: jetstream::Context, stream_name: impl Into<String>, subjects: SubjectBuilder) -> Self {
        Self {
            jetstream,
            stream_name: stream_name.into(),
            subjects,
        }
    }

    /// Client on the same stream and subjects as an event log
    pub fn for_log(log: &NatsEventLog) -> Self {
        Self::new(log.jetstream().clone(), log.stream_name(), log.subjects().clone())
    }
}

#[async_trait]
impl SubscriptionClient for NatsSubscriptionClient {
    async fn connect(
        &self,
        info: &PersistentSubscriptionInfo,
        settings: ConnectionSettings,
    ) -> Result<MessageStream, SubscriptionError> {
        let stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(&consumer_name(info), consumer_config(info, &self.subjects, settings))
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let messages = consumer
            .stream()
            .max_messages_per_batch(settings.inflight_messages.clamp(1, MAX_BATCH))
            .messages()
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        tracing::debug!(
            stream = %info.stream_name,
            group = %info.group_name,
            consumer = %consumer_name(info),
            "Connected to durable consumer"
        );

        let stream = messages
            .filter_map(|item| async move {
                match item {
                    Ok(message) => into_subscription_message(message).await.map(Ok),
                    Err(e) => Some(Err(SubscriptionError::Dropped(e.to_string()))),
                }
            })
            .boxed();

        Ok(stream)
    }
}

/// Wrap a JetStream message, terminating envelopes that cannot be read
async fn into_subscription_message(message: jetstream::Message) -> Option<SubscriptionMessage> {
    let retry_count = message
        .info()
        .map(|info| (info.delivered - 1).max(0) as u32)
        .unwrap_or(0);

    let record = serde_json::from_slice::<StoredRecord>(&message.payload)
        .and_then(StoredRecord::into_recorded_event);

    match record {
        Ok(record) => Some(SubscriptionMessage::new(
            record,
            retry_count,
            Box::new(NatsAcknowledger { message }),
        )),
        Err(e) => {
            tracing::error!(subject = %message.subject, error = %e, "Unreadable envelope, terminating message");
            if let Err(e) = message.ack_with(AckKind::Term).await {
                tracing::warn!(error = %e, "Failed to terminate message");
            }
            None
        }
    }
}

struct NatsAcknowledger {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for NatsAcknowledger {
    async fn ack(&self) -> Result<(), SubscriptionError> {
        self.message
            .ack()
            .await
            .map_err(|e| SubscriptionError::Ack(e.to_string()))
    }

    async fn nack(&self, action: NackAction, reason: &str) -> Result<(), SubscriptionError> {
        let kind = match action {
            NackAction::Retry => AckKind::Nak(None),
            NackAction::Park => AckKind::Term,
        };

        tracing::debug!(subject = %self.message.subject, ?action, reason, "Negative acknowledgement");

        self.message
            .ack_with(kind)
            .await
            .map_err(|e| SubscriptionError::Ack(e.to_string()))
    }
}

/// Lists persistent subscription groups from the stream's durable consumers
pub struct NatsSubscriptionCatalog {
    client: NatsSubscriptionClient,
    ttl: Duration,
    cache: RwLock<Option<(Instant, Arc<Vec<PersistentSubscriptionInfo>>)>>,
}

impl NatsSubscriptionCatalog {
    pub fn new(client: NatsSubscriptionClient) -> Self {
        Self {
            client,
            ttl: DEFAULT_CATALOG_TTL,
            cache: RwLock::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Define a group, creating its durable consumer if needed
    pub async fn create_subscription(
        &self,
        info: &PersistentSubscriptionInfo,
        settings: ConnectionSettings,
    ) -> Result<(), SubscriptionError> {
        let stream = self
            .client
            .jetstream
            .get_stream(&self.client.stream_name)
            .await
            .map_err(|e| SubscriptionError::Catalog(e.to_string()))?;

        stream
            .get_or_create_consumer(
                &consumer_name(info),
                consumer_config(info, &self.client.subjects, settings),
            )
            .await
            .map_err(|e| SubscriptionError::Catalog(e.to_string()))?;

        *self.cache.write().await = None;

        tracing::info!(stream = %info.stream_name, group = %info.group_name, "Persistent subscription group defined");
        Ok(())
    }

    async fn fetch(&self) -> Result<Vec<PersistentSubscriptionInfo>, SubscriptionError> {
        let stream = self
            .client
            .jetstream
            .get_stream(&self.client.stream_name)
            .await
            .map_err(|e| SubscriptionError::Catalog(e.to_string()))?;

        let mut consumers = stream.consumers();
        let mut subscriptions = Vec::new();

        while let Some(consumer) = consumers.next().await {
            let consumer = consumer.map_err(|e| SubscriptionError::Catalog(e.to_string()))?;

            let Some((stream_name, group_name)) = consumer.config.description.as_deref().and_then(parse_description)
            else {
                continue;
            };

            let mut info = PersistentSubscriptionInfo::new(stream_name, group_name);
            if consumer.config.max_deliver > 0 {
                info = info.with_max_retry_count((consumer.config.max_deliver - 1) as u32);
            }
            subscriptions.push(info);
        }

        subscriptions.sort_by_key(PersistentSubscriptionInfo::key);
        Ok(subscriptions)
    }
}

#[async_trait]
impl SubscriptionCatalog for NatsSubscriptionCatalog {
    async fn get_subscriptions(&self, use_cache: bool) -> Result<Vec<PersistentSubscriptionInfo>, SubscriptionError> {
        if use_cache {
            if let Some((fetched_at, subscriptions)) = self.cache.read().await.as_ref() {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(subscriptions.as_ref().clone());
                }
            }
        }

        let subscriptions = self.fetch().await?;
        *self.cache.write().await = Some((Instant::now(), Arc::new(subscriptions.clone())));

        tracing::debug!(count = subscriptions.len(), "Fetched persistent subscription catalog");
        Ok(subscriptions)
    }
}
