// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription Worker
//!
//! Keeps the set of running persistent subscriptions in line with the
//! catalog. Every config entry becomes one or more worker instances; each
//! instance owns a polling loop and the subscriptions it started.
//!
//! On every tick an instance computes the groups it is not running yet (see
//! [`get_new_subscriptions`]) and connects them. Existing subscriptions are
//! left alone. A dropped subscription leaves its instance's running set at
//! once and is reconnected on the following tick.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::events::DomainEventFactory;
use crate::handlers::EventHandlerResolver;
use crate::registry::TypeRegistry;
use crate::subscription::config::{SubscriptionWorkerConfig, WorkerPool};
use crate::subscription::persistent::{MessageDispatcher, PersistentSubscription, RunningSubscriptions};
use crate::subscription::{
    ConnectionSettings, PersistentSubscriptionInfo, SubscriptionCatalog, SubscriptionClient, SubscriptionKey,
};

/// Subscriptions from `all` that are not in `current` and pass the filters
///
/// Filter values are comma-separated substrings. Within one dimension the
/// include list narrows the candidates first and the ignore list then removes
/// from what remains. A descriptor must pass both the group and the stream
/// dimension.
pub fn get_new_subscriptions(
    all: &[PersistentSubscriptionInfo],
    current: &[PersistentSubscriptionInfo],
    groups_to_include: Option<&str>,
    groups_to_ignore: Option<&str>,
    streams_to_include: Option<&str>,
    streams_to_ignore: Option<&str>,
) -> Vec<PersistentSubscriptionInfo> {
    let running: HashSet<SubscriptionKey> = current.iter().map(PersistentSubscriptionInfo::key).collect();

    let groups = NameFilter::new(groups_to_include, groups_to_ignore);
    let streams = NameFilter::new(streams_to_include, streams_to_ignore);

    all.iter()
        .filter(|info| !running.contains(&info.key()))
        .filter(|info| groups.accepts(&info.group_name))
        .filter(|info| streams.accepts(&info.stream_name))
        .cloned()
        .collect()
}

/// Include/ignore substring lists of one dimension
struct NameFilter<'a> {
    include: Option<Vec<&'a str>>,
    ignore: Vec<&'a str>,
}

impl<'a> NameFilter<'a> {
    fn new(include: Option<&'a str>, ignore: Option<&'a str>) -> Self {
        Self {
            include: include.map(split_values).filter(|values| !values.is_empty()),
            ignore: ignore.map(split_values).unwrap_or_default(),
        }
    }

    fn accepts(&self, name: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.iter().any(|value| name.contains(value)) {
                return false;
            }
        }

        !self.ignore.iter().any(|value| name.contains(value))
    }
}

fn split_values(values: &str) -> Vec<&str> {
    values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect()
}

/// One polling loop and the subscriptions it started
#[derive(Debug)]
struct WorkerInstance {
    pool: WorkerPool,
    index: usize,
    config: SubscriptionWorkerConfig,
    settings: ConnectionSettings,
    dispatcher: MessageDispatcher,
    running: RunningSubscriptions,
}

impl WorkerInstance {
    /// Connect every subscription this instance should run but does not
    async fn poll(&self, client: &Arc<dyn SubscriptionClient>, catalog: &Arc<dyn SubscriptionCatalog>) -> usize {
        let all = match catalog.get_subscriptions(true).await {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!(pool = %self.pool, instance = self.index, error = %e, "Failed to list subscriptions");
                return 0;
            }
        };

        let current = self.running.infos().await;
        let new_subscriptions = get_new_subscriptions(
            &all,
            &current,
            self.config.groups_to_include.as_deref(),
            self.config.groups_to_ignore.as_deref(),
            self.config.streams_to_include.as_deref(),
            self.config.streams_to_ignore.as_deref(),
        );

        let mut started = 0;
        for info in new_subscriptions {
            let stream = info.stream_name.clone();
            let group = info.group_name.clone();

            match PersistentSubscription::start(
                info,
                self.settings,
                client.clone(),
                self.dispatcher.clone(),
                self.running.clone(),
            )
            .await
            {
                Ok(_) => started += 1,
                Err(e) => tracing::warn!(
                    pool = %self.pool,
                    instance = self.index,
                    stream = %stream,
                    group = %group,
                    error = %e,
                    "Failed to start persistent subscription"
                ),
            }
        }

        if started > 0 {
            tracing::info!(pool = %self.pool, instance = self.index, started, "Started persistent subscriptions");
        }

        started
    }

    async fn run(
        self: Arc<Self>,
        client: Arc<dyn SubscriptionClient>,
        catalog: Arc<dyn SubscriptionCatalog>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let interval = self.config.polling_interval();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = self.poll(&client, &catalog) => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!(pool = %self.pool, instance = self.index, "Polling loop stopped");
    }
}

/// Manages the persistent subscriptions of every configured pool
pub struct SubscriptionWorker {
    client: Arc<dyn SubscriptionClient>,
    catalog: Arc<dyn SubscriptionCatalog>,
    factory: DomainEventFactory,
    resolvers: HashMap<WorkerPool, Arc<EventHandlerResolver>>,
    configs: Vec<SubscriptionWorkerConfig>,
    instances: RwLock<Vec<Arc<WorkerInstance>>>,
    shutdown: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriptionWorker {
    pub fn new(
        client: Arc<dyn SubscriptionClient>,
        catalog: Arc<dyn SubscriptionCatalog>,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            client,
            catalog,
            factory: DomainEventFactory::new(registry),
            resolvers: HashMap::new(),
            configs: Vec::new(),
            instances: RwLock::new(Vec::new()),
            shutdown,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Handler resolver of a pool
    pub fn with_resolver(mut self, pool: WorkerPool, resolver: Arc<EventHandlerResolver>) -> Self {
        self.resolvers.insert(pool, resolver);
        self
    }

    pub fn with_config(mut self, config: SubscriptionWorkerConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_configs(mut self, configs: impl IntoIterator<Item = SubscriptionWorkerConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Build the worker instances of every enabled config entry
    ///
    /// An entry whose pool has no resolver yields no instance. Returns the
    /// number of instances built.
    ///
    /// Reconfiguring stops the previous instances and their subscriptions
    /// first; call [`start`](Self::start) again afterwards.
    pub async fn configure_subscriptions(&self) -> usize {
        if !self.instances.read().await.is_empty() {
            tracing::info!("Reconfiguring subscriptions, stopping previous instances");
            self.stop().await;
        }

        let mut instances = Vec::new();

        for config in self.configs.iter().filter(|config| config.enabled) {
            let Some(resolver) = self.resolvers.get(&config.pool) else {
                tracing::warn!(pool = %config.pool, "No event handler resolver for pool, skipping");
                continue;
            };

            let settings = ConnectionSettings {
                inflight_messages: config.effective_inflight_messages(),
            };
            let dispatcher = MessageDispatcher::new(self.factory.clone(), resolver.clone());

            for index in 0..config.effective_instance_count() {
                instances.push(Arc::new(WorkerInstance {
                    pool: config.pool,
                    index,
                    config: config.clone(),
                    settings,
                    dispatcher: dispatcher.clone(),
                    running: RunningSubscriptions::new(),
                }));
            }

            tracing::info!(
                pool = %config.pool,
                instances = config.effective_instance_count(),
                inflight = settings.inflight_messages,
                "Configured subscription pool"
            );
        }

        let count = instances.len();
        *self.instances.write().await = instances;
        count
    }

    /// Start one background polling loop per instance
    ///
    /// Returns immediately; the first poll runs right away.
    pub async fn start(&self) {
        self.shutdown.send_replace(false);

        let instances = self.instances.read().await.clone();
        let mut loops = self.loops.lock().await;

        for instance in instances {
            loops.push(tokio::spawn(instance.run(
                self.client.clone(),
                self.catalog.clone(),
                self.shutdown.subscribe(),
            )));
        }

        tracing::info!(loops = loops.len(), "Subscription worker started");
    }

    /// Stop polling and every running subscription
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let loops: Vec<JoinHandle<()>> = self.loops.lock().await.drain(..).collect();
        for handle in loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Polling loop failed");
            }
        }

        let instances = self.instances.read().await.clone();
        for instance in instances {
            for subscription in instance.running.drain().await {
                subscription.stop().await;
            }
        }

        tracing::info!("Subscription worker stopped");
    }

    /// Running subscriptions of every instance
    pub async fn persistent_subscriptions(&self) -> Vec<Arc<PersistentSubscription>> {
        let instances = self.instances.read().await.clone();

        let mut subscriptions = Vec::new();
        for instance in instances {
            subscriptions.extend(instance.running.list().await);
        }
        subscriptions
    }
}

impl fmt::Debug for SubscriptionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionWorker")
            .field("pools", &self.resolvers.keys().collect::<Vec<_>>())
            .field("configs", &self.configs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(stream: &str, group: &str) -> PersistentSubscriptionInfo {
        PersistentSubscriptionInfo::new(stream, group)
    }

    #[test]
    fn test_running_subscriptions_are_not_new() {
        let all = vec![info("$ce-Account", "Ledger"), info("$ce-Account", "Audit")];
        let current = vec![info("$ce-Account", "Ledger")];

        let new = get_new_subscriptions(&all, &current, None, None, None, None);

        assert_eq!(new, vec![info("$ce-Account", "Audit")]);
    }

    #[test]
    fn test_same_group_on_another_stream_is_new() {
        let all = vec![info("$ce-Account", "Ledger"), info("$ce-Order", "Ledger")];
        let current = vec![info("$ce-Account", "Ledger")];

        let new = get_new_subscriptions(&all, &current, None, None, None, None);

        assert_eq!(new, vec![info("$ce-Order", "Ledger")]);
    }

    #[test]
    fn test_blank_filter_values_are_ignored() {
        let all = vec![info("$ce-Account", "Ledger")];

        assert_eq!(get_new_subscriptions(&all, &[], Some(" , "), Some(""), None, None).len(), 1);
    }
}
