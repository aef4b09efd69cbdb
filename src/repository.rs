// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate Repository
//!
//! Loads aggregates by replaying their stream and saves pending events with
//! optimistic concurrency.
//!
//! # Transaction Semantics
//!
//! ```text
//! get_latest_version(id)
//!   1. read "{Type}-{id}" from event 0
//!   2. decode every record through the DomainEventFactory
//!   3. apply in order, commit, version = newest event number
//!
//! save_changes(&mut aggregate)
//!   1. no pending events → done, the log is not touched
//!   2. encode pending events through the EventDataFactory
//!   3. insert with expected version = version at load
//!   4. commit pending, version = new stream head
//! ```
//!
//! Every expected failure comes back as a [`Failure`]: a moved stream head is
//! [`FailureKind::Conflict`](crate::outcome::FailureKind::Conflict), a failing
//! store is `CriticalError`, undecodable history or a rejected apply is `Error`.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::aggregate::{stream_name, Aggregate, AggregateRoot, ApplyHandlers, AggregateVersion};
use crate::event_store::{EventLog, EventLogError};
use crate::events::{DomainEventFactory, EventDataFactory, RecordedEvent};
use crate::outcome::{Failure, Outcome};
use crate::registry::TypeRegistry;

/// Default number of trailing events replayed by
/// [`AggregateRepository::get_latest_version_from_last_event`]
pub const DEFAULT_TAIL_WINDOW: usize = 1;

impl From<EventLogError> for Failure {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::WrongExpectedVersion { .. } => Failure::conflict(err.to_string()),
            EventLogError::Unavailable(_) | EventLogError::Serialization(_) | EventLogError::PartialAppend { .. } => {
                Failure::critical(err.to_string())
            }
        }
    }
}

/// Loads and saves aggregates of type `A`
pub struct AggregateRepository<A: Aggregate> {
    log: Arc<dyn EventLog>,
    event_factory: DomainEventFactory,
    data_factory: EventDataFactory,
    handlers: Arc<ApplyHandlers<A>>,
    tail_window: usize,
}

impl<A: Aggregate> AggregateRepository<A> {
    pub fn new(log: Arc<dyn EventLog>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            log,
            event_factory: DomainEventFactory::new(registry.clone()),
            data_factory: EventDataFactory::new(registry),
            handlers: ApplyHandlers::<A>::for_aggregate(),
            tail_window: DEFAULT_TAIL_WINDOW,
        }
    }

    /// Number of trailing events replayed when loading from the last event
    pub fn with_tail_window(mut self, tail_window: usize) -> Self {
        self.tail_window = tail_window.max(1);
        self
    }

    pub fn tail_window(&self) -> usize {
        self.tail_window
    }

    /// Create a new, empty aggregate sharing this repository's handler table
    pub fn create(&self, aggregate_id: Uuid) -> AggregateRoot<A> {
        AggregateRoot::with_handlers(aggregate_id, self.handlers.clone())
    }

    /// Load an aggregate by replaying its whole stream
    ///
    /// A stream without events yields a fresh aggregate at version -1.
    #[tracing::instrument(skip(self), fields(aggregate = A::TYPE_NAME))]
    pub async fn get_latest_version(&self, aggregate_id: Uuid) -> Outcome<AggregateRoot<A>> {
        let stream = stream_name::<A>(aggregate_id);
        let records = self.log.read_events(&stream, 0).await?;

        self.replay(aggregate_id, &records)
    }

    /// Load an aggregate from the tail of its stream
    ///
    /// Replays the last [`tail_window`](Self::tail_window) events in
    /// chronological order. The version is the number of the newest event, so
    /// the result can be saved like a fully replayed aggregate.
    #[tracing::instrument(skip(self), fields(aggregate = A::TYPE_NAME))]
    pub async fn get_latest_version_from_last_event(&self, aggregate_id: Uuid) -> Outcome<AggregateRoot<A>> {
        let stream = stream_name::<A>(aggregate_id);
        let mut records = self.log.get_events_backward(&stream, self.tail_window).await?;
        records.reverse();

        self.replay(aggregate_id, &records)
    }

    /// Persist pending events and commit them into the aggregate's history
    #[tracing::instrument(
        skip(self, aggregate),
        fields(aggregate = A::TYPE_NAME, aggregate_id = %aggregate.id(), version = %aggregate.version())
    )]
    pub async fn save_changes(&self, aggregate: &mut AggregateRoot<A>) -> Outcome<()> {
        if !aggregate.has_pending_events() {
            return Ok(());
        }

        let pending = aggregate.pending_events();
        let events = self
            .data_factory
            .create_event_data_batch(&pending, aggregate.aggregate_metadata())
            .map_err(|e| Failure::error(e.to_string()))?;

        let new_version = match self
            .log
            .insert_events(&aggregate.stream_name(), aggregate.version(), events)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to append pending events");
                return Err(e.into());
            }
        };

        aggregate.commit_pending_events();
        aggregate.set_version(new_version);

        tracing::info!(
            events = pending.len(),
            new_version = %new_version,
            "Saved aggregate changes"
        );

        Ok(())
    }

    fn replay(&self, aggregate_id: Uuid, records: &[RecordedEvent]) -> Outcome<AggregateRoot<A>> {
        let mut aggregate = self.create(aggregate_id);

        let events = self
            .event_factory
            .create_domain_events(aggregate_id, records)
            .map_err(|e| Failure::error(e.to_string()))?;

        for event in events {
            aggregate
                .apply_shared(event)
                .map_err(|e| Failure::error(e.to_string()))?;
        }

        aggregate.commit_pending_events();
        if let Some(last) = records.last() {
            aggregate.set_version(AggregateVersion::new(last.event_number));
        }

        tracing::debug!(
            aggregate_id = %aggregate_id,
            events = records.len(),
            version = %aggregate.version(),
            "Replayed aggregate"
        );

        Ok(aggregate)
    }
}

impl<A: Aggregate> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            log: self.log.clone(),
            event_factory: self.event_factory.clone(),
            data_factory: self.data_factory.clone(),
            handlers: self.handlers.clone(),
            tail_window: self.tail_window,
        }
    }
}

impl<A: Aggregate> fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("aggregate", &A::TYPE_NAME)
            .field("tail_window", &self.tail_window)
            .finish()
    }
}
