// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory event log
//!
//! Keeps every stream in a map plus a global append order, so it can answer
//! both per-stream reads and `read_last_events_from_all`. Cloning shares the
//! underlying storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::aggregate::AggregateVersion;
use crate::event_store::{EventLog, EventLogError, EventLogResult};
use crate::events::{EventData, RecordedEvent};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, Vec<RecordedEvent>>,
    /// (stream, index) in global append order
    all: Vec<(String, usize)>,
}

/// Thread-safe in-memory [`EventLog`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventLog {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of a stream (`-1` when it has no events)
    pub async fn stream_version(&self, stream_id: &str) -> AggregateVersion {
        let inner = self.inner.read().await;
        inner
            .streams
            .get(stream_id)
            .map(|events| AggregateVersion::new(events.len() as i64 - 1))
            .unwrap_or(AggregateVersion::NEW)
    }

    /// Total number of records across all streams
    pub async fn len(&self) -> usize {
        self.inner.read().await.all.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn read_events(&self, stream_id: &str, from_version: i64) -> EventLogResult<Vec<RecordedEvent>> {
        let inner = self.inner.read().await;
        let start = from_version.max(0) as usize;

        Ok(inner
            .streams
            .get(stream_id)
            .map(|events| events.iter().skip(start).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_events_backward(&self, stream_id: &str, max_count: usize) -> EventLogResult<Vec<RecordedEvent>> {
        let inner = self.inner.read().await;

        Ok(inner
            .streams
            .get(stream_id)
            .map(|events| events.iter().rev().take(max_count).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_events(
        &self,
        stream_id: &str,
        expected_version: AggregateVersion,
        events: Vec<EventData>,
    ) -> EventLogResult<AggregateVersion> {
        let mut inner = self.inner.write().await;

        let actual = inner
            .streams
            .get(stream_id)
            .map_or(-1, |stream| stream.len() as i64 - 1);
        if actual != expected_version.value() {
            return Err(EventLogError::WrongExpectedVersion {
                stream: stream_id.to_string(),
                expected: expected_version.value(),
                actual,
            });
        }

        let stream = inner.streams.entry(stream_id.to_string()).or_default();
        let first_index = stream.len();
        let created = Utc::now();
        for (offset, event) in events.into_iter().enumerate() {
            stream.push(RecordedEvent {
                stream_id: stream_id.to_string(),
                event_id: event.event_id,
                event_type: event.event_type,
                event_number: (first_index + offset) as i64,
                data: event.data,
                metadata: event.metadata,
                created,
            });
        }
        let last_index = stream.len();
        let new_version = AggregateVersion::new(last_index as i64 - 1);

        inner
            .all
            .extend((first_index..last_index).map(|index| (stream_id.to_string(), index)));

        tracing::debug!(
            stream = %stream_id,
            version = %new_version,
            "Appended events to in-memory log"
        );

        Ok(new_version)
    }

    async fn read_last_events_from_all(&self, count: usize) -> EventLogResult<Vec<RecordedEvent>> {
        let inner = self.inner.read().await;

        Ok(inner
            .all
            .iter()
            .rev()
            .take(count)
            .filter_map(|(stream, index)| inner.streams.get(stream).and_then(|s| s.get(*index)))
            .cloned()
            .collect())
    }
}
