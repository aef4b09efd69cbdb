// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event sourcing infrastructure for the Composable Information Machine
//!
//! Two halves share one type registry:
//!
//! - **Aggregate persistence**: aggregates are rebuilt by replaying their
//!   stream of the event log and saved with optimistic concurrency, either
//!   through an [`AggregateRepository`] or the read-through
//!   [`AggregateService`].
//! - **Persistent subscriptions**: a [`SubscriptionWorker`] keeps a fleet of
//!   consumer-group subscriptions running and dispatches decoded events to
//!   [`EventHandler`]s.
//!
//! The event log, subscription client and catalog are ports with in-memory
//! implementations and, with the `nats` feature, JetStream ones.

pub mod aggregate;
pub mod cache;
pub mod errors;
pub mod event_store;
pub mod events;
pub mod handlers;
pub mod health;
#[cfg(feature = "nats")]
pub mod jetstream;
pub mod outcome;
pub mod registry;
pub mod repository;
pub mod service;
pub mod state_machine;
pub mod subjects;
pub mod subscription;

/// Stream names starting with this marker belong to the log itself
pub const SYSTEM_STREAM_PREFIX: &str = "$";

// Re-export commonly used types
pub use aggregate::{Aggregate, AggregateRoot, AggregateVersion, ApplyError, ApplyHandlers};
pub use cache::{Cache, CacheEntryOptions, InMemoryCache};
pub use errors::{InfrastructureError, InfrastructureResult};
pub use event_store::{EventLog, EventLogError, EventLogResult, InMemoryEventLog};
#[cfg(feature = "nats")]
pub use event_store::{NatsEventLog, NatsEventLogConfig};
pub use events::{
    AnyDomainEvent, DomainEvent, DomainEventFactory, EventData, EventDataFactory, EventHeader, EventRef,
    RecordedEvent,
};
pub use handlers::{dispatch_to_handlers, EventHandler, EventHandlerResolver};
pub use outcome::{Failure, FailureKind, Outcome};
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use repository::AggregateRepository;
pub use service::AggregateService;
pub use subscription::{
    get_new_subscriptions, PersistentSubscription, PersistentSubscriptionInfo, SubscriptionWorker,
    SubscriptionWorkerConfig, WorkerPool,
};
