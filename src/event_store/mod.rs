// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Log Port
//!
//! The append-only log aggregates are loaded from and saved to. Streams are
//! named `"{AggregateType}-{aggregate_id}"`; event numbers within a stream
//! start at 0 and the stream version is the number of its newest event.
//!
//! # Architecture
//!
//! ```text
//! AggregateRepository ──read_events / get_events_backward──► EventLog
//!                     ──insert_events(expected version)────►    │
//!                                                               ├── InMemoryEventLog
//! health probe ───────read_last_events_from_all────────────►    └── NatsEventLog (JetStream)
//! ```
//!
//! # Requirements
//!
//! 1. **Append-Only**: Records are never updated or deleted
//! 2. **No silent partial writes**: An insert either stores all of its
//!    records or none. A log that publishes records one by one (JetStream)
//!    reports an insert that failed after storing some of them as
//!    [`EventLogError::PartialAppend`], never as a plain failure
//! 3. **Optimistic**: An insert against a stale expected version is rejected
//!    with [`EventLogError::WrongExpectedVersion`]

use async_trait::async_trait;

use crate::aggregate::AggregateVersion;
use crate::events::{EventData, RecordedEvent};

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;

pub use memory::InMemoryEventLog;
#[cfg(feature = "nats")]
pub use nats::{NatsEventLog, NatsEventLogConfig};

/// Errors raised by event log implementations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventLogError {
    /// The stream head moved since the aggregate was loaded
    #[error("Concurrency conflict on '{stream}': expected version {expected}, actual version {actual}")]
    WrongExpectedVersion {
        stream: String,
        expected: i64,
        actual: i64,
    },

    /// The backing store could not be reached or failed internally
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be encoded or decoded
    #[error("Event log serialization error: {0}")]
    Serialization(String),

    /// An insert failed after some of its records were stored
    ///
    /// The stream head moved by `stored`; the caller must reload before
    /// writing again.
    #[error("Partial append to '{stream}': {stored} of {requested} records stored before failure: {reason}")]
    PartialAppend {
        stream: String,
        stored: usize,
        requested: usize,
        reason: String,
    },
}

impl From<serde_json::Error> for EventLogError {
    fn from(err: serde_json::Error) -> Self {
        EventLogError::Serialization(err.to_string())
    }
}

/// Result type for event log operations
pub type EventLogResult<T> = Result<T, EventLogError>;

/// Append-only event log
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Read a stream forward, starting at event number `from_version` (inclusive)
    ///
    /// A stream without events yields an empty vector.
    async fn read_events(&self, stream_id: &str, from_version: i64) -> EventLogResult<Vec<RecordedEvent>>;

    /// Read up to `max_count` records from the end of a stream, newest first
    async fn get_events_backward(&self, stream_id: &str, max_count: usize) -> EventLogResult<Vec<RecordedEvent>>;

    /// Append records to a stream
    ///
    /// `expected_version` is the stream version the caller last observed
    /// ([`AggregateVersion::NEW`] for a stream that must not exist yet).
    /// Returns the new stream version.
    async fn insert_events(
        &self,
        stream_id: &str,
        expected_version: AggregateVersion,
        events: Vec<EventData>,
    ) -> EventLogResult<AggregateVersion>;

    /// Read up to `count` of the most recently appended records across all streams, newest first
    async fn read_last_events_from_all(&self, count: usize) -> EventLogResult<Vec<RecordedEvent>>;
}
