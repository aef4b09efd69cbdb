// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cache-aware aggregate service
//!
//! | Operation                       | Cache read | Cache write           |
//! |---------------------------------|------------|-----------------------|
//! | `get`                           | yes        | on successful load    |
//! | `get_latest`                    | no         | on successful load    |
//! | `get_latest_from_last_event`    | no         | no (partial replay)   |
//! | `save`                          | no         | on successful save    |
//!
//! Cache writes only happen for aggregate types opted in through
//! [`AggregateService::add_cached_aggregate`]. Every write is versioned: a
//! load that finishes after a concurrent save never replaces the saved
//! aggregate with its older replay.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::{stream_name, Aggregate, AggregateRoot};
use crate::cache::{Cache, CacheEntryOptions};
use crate::event_store::EventLog;
use crate::outcome::Outcome;
use crate::registry::TypeRegistry;
use crate::repository::{AggregateRepository, DEFAULT_TAIL_WINDOW};

type AnyRepository = Arc<dyn Any + Send + Sync>;

/// Loads and saves aggregates of any registered type, caching opted-in types
pub struct AggregateService {
    log: Arc<dyn EventLog>,
    registry: Arc<TypeRegistry>,
    cache: Arc<dyn Cache>,
    policies: RwLock<HashMap<TypeId, CacheEntryOptions>>,
    repositories: RwLock<HashMap<TypeId, AnyRepository>>,
    tail_window: usize,
}

impl AggregateService {
    pub fn new(log: Arc<dyn EventLog>, registry: Arc<TypeRegistry>, cache: Arc<dyn Cache>) -> Self {
        Self {
            log,
            registry,
            cache,
            policies: RwLock::new(HashMap::new()),
            repositories: RwLock::new(HashMap::new()),
            tail_window: DEFAULT_TAIL_WINDOW,
        }
    }

    /// Tail window handed to every repository this service creates
    pub fn with_tail_window(mut self, tail_window: usize) -> Self {
        self.tail_window = tail_window.max(1);
        self
    }

    /// Opt aggregate type `A` into caching
    ///
    /// `None` uses [`CacheEntryOptions::default`].
    pub async fn add_cached_aggregate<A: Aggregate>(&self, options: Option<CacheEntryOptions>) {
        let options = options.unwrap_or_default();
        self.policies.write().await.insert(TypeId::of::<A>(), options);

        tracing::debug!(aggregate = A::TYPE_NAME, ?options, "Aggregate type opted into caching");
    }

    /// Opt aggregate type `A` out of caching
    pub async fn remove_cached_aggregate<A: Aggregate>(&self) {
        self.policies.write().await.remove(&TypeId::of::<A>());
    }

    pub async fn is_cached<A: Aggregate>(&self) -> bool {
        self.policies.read().await.contains_key(&TypeId::of::<A>())
    }

    /// Cache-first load
    pub async fn get<A: Aggregate>(&self, aggregate_id: Uuid) -> Outcome<AggregateRoot<A>> {
        let policy = self.policy::<A>().await;
        let key = stream_name::<A>(aggregate_id);

        if policy.is_some() {
            if let Some(cached) = self.cache.get(&key).await {
                if let Some(aggregate) = cached.downcast_ref::<AggregateRoot<A>>() {
                    tracing::debug!(key = %key, "Aggregate served from cache");
                    return Ok(aggregate.clone());
                }
            }
        }

        let aggregate = self.repository::<A>().await.get_latest_version(aggregate_id).await?;
        if let Some(options) = policy {
            self.store(&aggregate, options).await;
        }

        Ok(aggregate)
    }

    /// Full replay from the log, bypassing the cache on read
    pub async fn get_latest<A: Aggregate>(&self, aggregate_id: Uuid) -> Outcome<AggregateRoot<A>> {
        let aggregate = self.repository::<A>().await.get_latest_version(aggregate_id).await?;

        if let Some(options) = self.policy::<A>().await {
            self.store(&aggregate, options).await;
        }

        Ok(aggregate)
    }

    /// Tail replay from the log; never touches the cache
    pub async fn get_latest_from_last_event<A: Aggregate>(&self, aggregate_id: Uuid) -> Outcome<AggregateRoot<A>> {
        self.repository::<A>()
            .await
            .get_latest_version_from_last_event(aggregate_id)
            .await
    }

    /// Persist pending events, then refresh the cache entry for opted-in types
    pub async fn save<A: Aggregate>(&self, aggregate: &mut AggregateRoot<A>) -> Outcome<()> {
        self.repository::<A>().await.save_changes(aggregate).await?;

        if let Some(options) = self.policy::<A>().await {
            self.store(aggregate, options).await;
        }

        Ok(())
    }

    /// Repository for `A`, created on first use
    pub async fn repository<A: Aggregate>(&self) -> Arc<AggregateRepository<A>> {
        let type_id = TypeId::of::<A>();

        if let Some(repository) = self.repositories.read().await.get(&type_id) {
            if let Ok(repository) = repository.clone().downcast::<AggregateRepository<A>>() {
                return repository;
            }
        }

        let mut repositories = self.repositories.write().await;
        if let Some(repository) = repositories.get(&type_id) {
            if let Ok(repository) = repository.clone().downcast::<AggregateRepository<A>>() {
                return repository;
            }
        }

        let repository = Arc::new(
            AggregateRepository::<A>::new(self.log.clone(), self.registry.clone())
                .with_tail_window(self.tail_window),
        );
        let shared: AnyRepository = repository.clone();
        repositories.insert(type_id, shared);

        tracing::debug!(aggregate = A::TYPE_NAME, "Aggregate repository created");
        repository
    }

    async fn store<A: Aggregate>(&self, aggregate: &AggregateRoot<A>, options: CacheEntryOptions) {
        let key = aggregate.stream_name();
        let version = aggregate.version();

        if !self
            .cache
            .set_if_newer(&key, Arc::new(aggregate.clone()), version.value(), options)
            .await
        {
            tracing::debug!(key = %key, %version, "Cache holds a newer aggregate, keeping it");
        }
    }

    async fn policy<A: Aggregate>(&self) -> Option<CacheEntryOptions> {
        self.policies.read().await.get(&TypeId::of::<A>()).copied()
    }
}

impl fmt::Debug for AggregateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateService")
            .field("registry", &self.registry.len())
            .field("tail_window", &self.tail_window)
            .finish()
    }
}
