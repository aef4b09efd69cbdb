// Copyright (c) 2025 - Cowboy AI, Inc.

//! JetStream configuration and setup for the event log
//!
//! One JetStream stream holds every aggregate stream of the log; each
//! aggregate stream is a subject (see [`crate::subjects`]), so per-subject
//! sequence checks give optimistic concurrency and durable consumers give
//! persistent subscriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_event_sourcing::jetstream::{create_event_stream, JetStreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = async_nats::connect("nats://localhost:4222").await?;
//!     let jetstream = async_nats::jetstream::new(client);
//!
//!     let stream = create_event_stream(jetstream, JetStreamConfig::default()).await?;
//!
//!     Ok(())
//! }
//! ```

use async_nats::jetstream::{self, stream::Stream};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::events::{EventData, RecordedEvent};

/// Default JetStream stream name
pub const DEFAULT_STREAM_NAME: &str = "EVENT_LOG";

/// Configuration for the JetStream stream backing the event log
#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    /// Stream name
    pub stream_name: String,

    /// Subjects this stream will capture (defaults to "events.>")
    pub subjects: Vec<String>,

    /// Maximum age of messages (default: unlimited)
    pub max_age: Duration,

    /// Maximum bytes stored in stream (default: 10GB)
    pub max_bytes: i64,

    /// Storage type (File or Memory)
    pub storage: StorageType,

    /// Number of replicas (for clustered NATS)
    pub replicas: usize,

    /// Window in which duplicate message IDs are rejected
    pub duplicate_window: Duration,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            subjects: vec![format!("{}.>", crate::subjects::DEFAULT_SUBJECT_PREFIX)],
            max_age: Duration::ZERO,
            max_bytes: 10 * 1024 * 1024 * 1024, // 10 GB
            storage: StorageType::File,
            replicas: 1,
            duplicate_window: Duration::from_secs(2 * 60),
        }
    }
}

/// Storage type for JetStream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// File-based storage (persistent across restarts)
    File,
    /// Memory-based storage (faster, but lost on restart)
    Memory,
}

/// Stored record envelope
///
/// The JSON document published for every appended event. It carries the
/// stream position explicitly so readers never depend on JetStream sequence
/// numbers, which are global to the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Aggregate stream the record belongs to
    pub stream_id: String,

    /// Record key (the domain event ID)
    pub event_id: Uuid,

    /// Registered event tag
    pub event_type: String,

    /// Position within the aggregate stream, starting at 0
    pub event_number: i64,

    /// When the record was appended
    pub created: DateTime<Utc>,

    /// Event payload
    pub data: serde_json::Value,

    /// Write metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl StoredRecord {
    /// Wrap a write record at the given stream position
    pub fn from_event_data(stream_id: &str, event_number: i64, event: &EventData) -> serde_json::Result<Self> {
        let metadata = if event.metadata.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&event.metadata)?
        };

        Ok(Self {
            stream_id: stream_id.to_string(),
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            event_number,
            created: Utc::now(),
            data: serde_json::from_slice(&event.data)?,
            metadata,
        })
    }

    /// Convert into the raw record handed to event factories
    pub fn into_recorded_event(self) -> serde_json::Result<RecordedEvent> {
        Ok(RecordedEvent {
            stream_id: self.stream_id,
            event_id: self.event_id,
            event_type: self.event_type,
            event_number: self.event_number,
            data: Bytes::from(serde_json::to_vec(&self.data)?),
            metadata: Bytes::from(serde_json::to_vec(&self.metadata)?),
            created: self.created,
        })
    }
}

/// Create or update the event log stream
///
/// Idempotent: creates the stream if it doesn't exist and returns the
/// existing one otherwise.
pub async fn create_event_stream(
    jetstream: jetstream::Context,
    config: JetStreamConfig,
) -> InfrastructureResult<Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.subjects,
        max_age: config.max_age,
        max_bytes: config.max_bytes,
        storage,
        num_replicas: config.replicas,
        duplicate_window: config.duplicate_window,
        ..Default::default()
    };

    let stream = jetstream
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| InfrastructureError::NatsConnection(e.to_string()))?;

    tracing::info!(stream = %config.stream_name, "Event log stream ready");

    Ok(stream)
}
