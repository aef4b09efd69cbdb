// Copyright (c) 2025 - Cowboy AI, Inc.
//! One connection to a persistent subscription group
//!
//! A [`PersistentSubscription`] owns a receive task. Each message is handled
//! by the [`MessageDispatcher`]:
//!
//! | Message                          | Outcome                   |
//! |----------------------------------|---------------------------|
//! | stream starts with `$`           | ack, never decoded        |
//! | payload cannot be decoded        | nack, parked              |
//! | no handler for the event tag     | ack                       |
//! | every handler succeeded          | ack                       |
//! | at least one handler failed      | nack, retried by the log  |
//!
//! At most `inflight_messages` messages are processed at once; with an
//! inflight window of 1 messages are handled strictly in delivery order.
//!
//! When the message stream fails or ends the subscription moves to
//! `Disconnected` and removes itself from the [`RunningSubscriptions`] it was
//! registered in, so the owning worker reconnects it on its next poll.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::events::DomainEventFactory;
use crate::handlers::{dispatch_to_handlers, EventHandlerResolver};
use crate::state_machine::{StateMachineWithHistory, Transition};
use crate::subscription::lifecycle::{ConnectionInput, ConnectionState};
use crate::subscription::{
    ConnectionSettings, MessageStream, NackAction, PersistentSubscriptionInfo, SubscriptionClient,
    SubscriptionError, SubscriptionKey, SubscriptionMessage,
};

/// Decodes delivered records and routes them to handlers
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    factory: DomainEventFactory,
    resolver: Arc<EventHandlerResolver>,
}

impl MessageDispatcher {
    pub fn new(factory: DomainEventFactory, resolver: Arc<EventHandlerResolver>) -> Self {
        Self { factory, resolver }
    }

    /// Handle one message and settle it with exactly one ack or nack
    pub async fn handle(&self, key: &SubscriptionKey, message: SubscriptionMessage) {
        let record = &message.record;

        if record.is_system_stream() {
            tracing::debug!(subscription = %key, stream = %record.stream_id, "Skipping system stream message");
            settle(key, message.ack().await);
            return;
        }

        let event = match self
            .factory
            .create_domain_event(aggregate_id_of(&record.stream_id), record)
        {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(
                    subscription = %key,
                    stream = %record.stream_id,
                    event_number = record.event_number,
                    error = %e,
                    "Failed to decode event, parking message"
                );
                settle(key, message.nack(NackAction::Park, &e.to_string()).await);
                return;
            }
        };

        let handlers = match self.resolver.get_domain_event_handlers(&event) {
            Ok(handlers) => handlers,
            Err(_) => {
                tracing::debug!(subscription = %key, event_type = %event.event_type(), "No handler interested");
                settle(key, message.ack().await);
                return;
            }
        };

        match dispatch_to_handlers(event.clone(), &handlers).await {
            Ok(()) => {
                tracing::debug!(subscription = %key, event_id = %event.event_id(), "Event handled");
                settle(key, message.ack().await);
            }
            Err(failure) => {
                tracing::warn!(
                    subscription = %key,
                    event_id = %event.event_id(),
                    retry_count = message.retry_count,
                    error = %failure,
                    "Event handling failed, requesting retry"
                );
                settle(key, message.nack(NackAction::Retry, &failure.to_string()).await);
            }
        }
    }
}

fn settle(key: &SubscriptionKey, result: Result<(), SubscriptionError>) {
    if let Err(e) = result {
        tracing::warn!(subscription = %key, error = %e, "Failed to settle message");
    }
}

/// Aggregate ID encoded in a `"{Type}-{uuid}"` stream name, nil otherwise
fn aggregate_id_of(stream_id: &str) -> Uuid {
    stream_id
        .split_once('-')
        .and_then(|(_, id)| Uuid::parse_str(id).ok())
        .unwrap_or(Uuid::nil())
}

/// Shared set of live subscriptions, keyed by stream + group
#[derive(Debug, Clone, Default)]
pub struct RunningSubscriptions {
    inner: Arc<RwLock<HashMap<SubscriptionKey, Arc<PersistentSubscription>>>>,
}

impl RunningSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &SubscriptionKey) -> bool {
        self.inner.read().await.contains_key(key)
    }

    /// Descriptors of every live subscription
    pub async fn infos(&self) -> Vec<PersistentSubscriptionInfo> {
        self.inner.read().await.values().map(|s| s.info().clone()).collect()
    }

    pub async fn list(&self) -> Vec<Arc<PersistentSubscription>> {
        self.inner.read().await.values().cloned().collect()
    }

    async fn insert(&self, subscription: Arc<PersistentSubscription>) {
        self.inner.write().await.insert(subscription.key(), subscription);
    }

    /// Remove the entry for `key` if it is still the subscription `instance`
    async fn remove_instance(&self, key: &SubscriptionKey, instance: Uuid) {
        let mut inner = self.inner.write().await;
        if inner.get(key).is_some_and(|s| s.instance_id == instance) {
            inner.remove(key);
        }
    }

    /// Remove and return every entry
    pub(crate) async fn drain(&self) -> Vec<Arc<PersistentSubscription>> {
        self.inner.write().await.drain().map(|(_, s)| s).collect()
    }
}

/// A live connection to one persistent subscription group
pub struct PersistentSubscription {
    instance_id: Uuid,
    info: PersistentSubscriptionInfo,
    settings: ConnectionSettings,
    lifecycle: Mutex<StateMachineWithHistory<ConnectionState>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PersistentSubscription {
    /// Connect to the group and start receiving
    ///
    /// The subscription is registered in `running` before the first message
    /// is received. A failed connect leaves `running` untouched.
    pub async fn start(
        info: PersistentSubscriptionInfo,
        settings: ConnectionSettings,
        client: Arc<dyn SubscriptionClient>,
        dispatcher: MessageDispatcher,
        running: RunningSubscriptions,
    ) -> Result<Arc<Self>, SubscriptionError> {
        let messages = client.connect(&info, settings).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut lifecycle = StateMachineWithHistory::new(ConnectionState::Disconnected);
        lifecycle
            .transition_with_history(ConnectionInput::Connect, Utc::now())
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let subscription = Arc::new(Self {
            instance_id: Uuid::now_v7(),
            info,
            settings,
            lifecycle: Mutex::new(lifecycle),
            shutdown,
            task: Mutex::new(None),
        });

        running.insert(subscription.clone()).await;

        tracing::info!(
            stream = %subscription.info.stream_name,
            group = %subscription.info.group_name,
            inflight = settings.inflight_messages,
            "Persistent subscription connected"
        );

        let handle = tokio::spawn(
            subscription
                .clone()
                .receive(messages, dispatcher, running, shutdown_rx),
        );
        *subscription.task.lock().await = Some(handle);

        Ok(subscription)
    }

    pub fn info(&self) -> &PersistentSubscriptionInfo {
        &self.info
    }

    pub fn key(&self) -> SubscriptionKey {
        self.info.key()
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    pub fn inflight_messages(&self) -> usize {
        self.settings.inflight_messages
    }

    pub async fn state(&self) -> ConnectionState {
        *self.lifecycle.lock().await.current_state()
    }

    /// Recorded connection transitions
    pub async fn transitions(&self) -> Vec<Transition<ConnectionState, ConnectionInput>> {
        self.lifecycle.lock().await.history().to_vec()
    }

    /// Stop receiving and wait for in-flight messages to settle
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(subscription = %self.key(), error = %e, "Receive task failed");
            }
        }
    }

    async fn receive(
        self: Arc<Self>,
        mut messages: MessageStream,
        dispatcher: MessageDispatcher,
        running: RunningSubscriptions,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let key = self.key();
        let window = Arc::new(Semaphore::new(self.settings.inflight_messages.max(1)));
        let mut in_flight = JoinSet::new();

        let dropped = loop {
            if *shutdown.borrow() {
                break None;
            }

            tokio::select! {
                message = messages.next() => match message {
                    Some(Ok(message)) => {
                        let permit = tokio::select! {
                            permit = window.clone().acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break None,
                            },
                            _ = shutdown.changed() => break None,
                        };

                        let dispatcher = dispatcher.clone();
                        let key = key.clone();
                        in_flight.spawn(async move {
                            dispatcher.handle(&key, message).await;
                            drop(permit);
                        });
                        while in_flight.try_join_next().is_some() {}
                    }
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break Some("message stream ended".to_string()),
                },
                _ = shutdown.changed() => break None,
            }
        };

        let input = match dropped {
            Some(reason) => {
                tracing::warn!(
                    stream = %self.info.stream_name,
                    group = %self.info.group_name,
                    reason = %reason,
                    "Persistent subscription dropped"
                );
                ConnectionInput::Dropped(reason)
            }
            None => {
                tracing::info!(
                    stream = %self.info.stream_name,
                    group = %self.info.group_name,
                    "Persistent subscription stopped"
                );
                ConnectionInput::Stopped
            }
        };

        if let Err(e) = self
            .lifecycle
            .lock()
            .await
            .transition_with_history(input, Utc::now())
        {
            tracing::warn!(subscription = %key, error = %e, "Unexpected connection transition");
        }

        // Removed before in-flight handlers drain; the worker may reconnect
        // while they finish
        running.remove_instance(&key, self.instance_id).await;

        while in_flight.join_next().await.is_some() {}
    }
}

impl fmt::Debug for PersistentSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentSubscription")
            .field("instance_id", &self.instance_id)
            .field("info", &self.info)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_id_from_stream_name() {
        let id = Uuid::now_v7();

        assert_eq!(aggregate_id_of(&format!("Account-{}", id)), id);
        assert_eq!(aggregate_id_of("$stats-127.0.0.1:2113"), Uuid::nil());
        assert_eq!(aggregate_id_of("Settings"), Uuid::nil());
    }
}
