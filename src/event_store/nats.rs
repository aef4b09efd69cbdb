// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream Event Log Implementation
//!
//! Every aggregate stream is one subject of a single JetStream stream.
//! Appends publish a [`StoredRecord`] envelope per event with the
//! `Nats-Expected-Last-Subject-Sequence` header, so JetStream itself rejects
//! a write against a stream head that moved since it was read.
//!
//! ```text
//! insert_events("Account-42", expected 3, [e4, e5])
//!   read subject  events.Account.42        → head 3, last seq 118
//!   publish e4    expected-last-subject 118 → seq 121
//!   publish e5    expected-last-subject 121 → seq 122
//! ```
//!
//! The message ID of each publish is the event ID, so a retried append is
//! de-duplicated by JetStream within the stream's duplicate window.
//!
//! JetStream has no multi-message transaction, so a publish that fails after
//! earlier records of the same insert were acknowledged is reported as
//! [`EventLogError::PartialAppend`].

use std::time::Duration;

use async_nats::jetstream::{self, context::Publish, stream::Stream};
use async_trait::async_trait;
use futures::StreamExt;

use crate::aggregate::AggregateVersion;
use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::event_store::{EventLog, EventLogError, EventLogResult};
use crate::events::{EventData, RecordedEvent};
use crate::jetstream::{create_event_stream, JetStreamConfig, StoredRecord};
use crate::subjects::{SubjectBuilder, DEFAULT_SUBJECT_PREFIX};

const BATCH_SIZE: usize = 10000;
const FETCH_EXPIRY: Duration = Duration::from_secs(2);

/// Connection settings for [`NatsEventLog`]
#[derive(Debug, Clone)]
pub struct NatsEventLogConfig {
    /// NATS server URL
    pub nats_url: String,

    /// JetStream stream settings
    pub stream: JetStreamConfig,

    /// Root subject of every aggregate stream
    pub subject_prefix: String,
}

impl Default for NatsEventLogConfig {
    fn default() -> Self {
        Self {
            nats_url: "localhost:4222".to_string(),
            stream: JetStreamConfig::default(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }
}

impl NatsEventLogConfig {
    /// Load from `NATS_URL`, `NATS_STREAM` and `NATS_SUBJECT_PREFIX`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let nats_url = std::env::var("NATS_URL").unwrap_or(defaults.nats_url);
        let subject_prefix = std::env::var("NATS_SUBJECT_PREFIX").unwrap_or(defaults.subject_prefix);
        let stream_name = std::env::var("NATS_STREAM").unwrap_or(defaults.stream.stream_name);

        Self {
            nats_url,
            stream: JetStreamConfig {
                stream_name,
                subjects: vec![format!("{}.>", subject_prefix)],
                ..defaults.stream
            },
            subject_prefix,
        }
    }
}

/// NATS JetStream-backed event log
///
/// # Example
///
/// ```rust,no_run
/// use cim_event_sourcing::event_store::{NatsEventLog, NatsEventLogConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let log = NatsEventLog::connect(NatsEventLogConfig::from_env()).await?;
///     // Use log...
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct NatsEventLog {
    jetstream: jetstream::Context,
    stream: Stream,
    subjects: SubjectBuilder,
}

impl NatsEventLog {
    /// Connect to NATS and create or get the event log stream
    pub async fn connect(config: NatsEventLogConfig) -> InfrastructureResult<Self> {
        let client = async_nats::connect(&config.nats_url)
            .await
            .map_err(|e| InfrastructureError::NatsConnection(e.to_string()))?;

        Self::with_client(client, config).await
    }

    /// Build on an existing NATS connection
    pub async fn with_client(client: async_nats::Client, config: NatsEventLogConfig) -> InfrastructureResult<Self> {
        let jetstream = jetstream::new(client);
        let stream = create_event_stream(jetstream.clone(), config.stream).await?;

        Ok(Self {
            jetstream,
            stream,
            subjects: SubjectBuilder::new(config.subject_prefix),
        })
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Name of the JetStream stream holding the log
    pub fn stream_name(&self) -> &str {
        &self.stream.cached_info().config.name
    }

    pub fn subjects(&self) -> &SubjectBuilder {
        &self.subjects
    }

    /// Read every envelope matching `filter_subject`, with its stream sequence
    async fn read_envelopes(
        &self,
        filter_subject: String,
        deliver_policy: jetstream::consumer::DeliverPolicy,
        limit: Option<usize>,
    ) -> EventLogResult<Vec<(u64, StoredRecord)>> {
        let consumer = self
            .stream
            .create_consumer(jetstream::consumer::pull::Config {
                filter_subject,
                deliver_policy,
                ack_policy: jetstream::consumer::AckPolicy::None,
                ..Default::default()
            })
            .await
            .map_err(|e| EventLogError::Unavailable(e.to_string()))?;

        let mut envelopes = Vec::new();

        loop {
            let batch_size = match limit {
                Some(limit) => (limit - envelopes.len()).min(BATCH_SIZE),
                None => BATCH_SIZE,
            };
            if batch_size == 0 {
                break;
            }

            let messages_result = consumer
                .fetch()
                .max_messages(batch_size)
                .expires(FETCH_EXPIRY)
                .messages()
                .await;

            // A fetch that times out means no more messages
            let mut messages = match messages_result {
                Ok(msgs) => msgs,
                Err(e) => {
                    let err_msg = e.to_string().to_lowercase();
                    if err_msg.contains("timeout") || err_msg.contains("timed out") || err_msg.contains("no messages") {
                        break;
                    }
                    return Err(EventLogError::Unavailable(e.to_string()));
                }
            };

            let mut batch_count = 0;

            while let Some(message) = messages.next().await {
                let msg = message.map_err(|e| EventLogError::Unavailable(e.to_string()))?;
                let sequence = msg
                    .info()
                    .map_err(|e| EventLogError::Unavailable(e.to_string()))?
                    .stream_sequence;
                let envelope: StoredRecord = serde_json::from_slice(&msg.payload)?;

                envelopes.push((sequence, envelope));
                batch_count += 1;
            }

            if batch_count < batch_size {
                break;
            }
        }

        Ok(envelopes)
    }

    /// Envelopes of one aggregate stream in stream order
    async fn read_stream(&self, stream_id: &str) -> EventLogResult<Vec<(u64, StoredRecord)>> {
        let mut envelopes = self
            .read_envelopes(
                self.subjects.stream_subject(stream_id),
                jetstream::consumer::DeliverPolicy::All,
                None,
            )
            .await?;

        // Different stream ids can sanitize to the same subject
        envelopes.retain(|(_, envelope)| envelope.stream_id == stream_id);
        envelopes.sort_by_key(|(_, envelope)| envelope.event_number);
        Ok(envelopes)
    }

    async fn current_version(&self, stream_id: &str) -> EventLogResult<i64> {
        let envelopes = self.read_stream(stream_id).await?;
        Ok(envelopes.last().map(|(_, e)| e.event_number).unwrap_or(-1))
    }
}

fn into_records(envelopes: Vec<(u64, StoredRecord)>) -> EventLogResult<Vec<RecordedEvent>> {
    envelopes
        .into_iter()
        .map(|(_, envelope)| envelope.into_recorded_event().map_err(EventLogError::from))
        .collect()
}

#[async_trait]
impl EventLog for NatsEventLog {
    async fn read_events(&self, stream_id: &str, from_version: i64) -> EventLogResult<Vec<RecordedEvent>> {
        let mut envelopes = self.read_stream(stream_id).await?;
        envelopes.retain(|(_, envelope)| envelope.event_number >= from_version);
        into_records(envelopes)
    }

    async fn get_events_backward(&self, stream_id: &str, max_count: usize) -> EventLogResult<Vec<RecordedEvent>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let mut envelopes = if max_count == 1 {
            let mut last = self
                .read_envelopes(
                    self.subjects.stream_subject(stream_id),
                    jetstream::consumer::DeliverPolicy::LastPerSubject,
                    Some(1),
                )
                .await?;
            last.retain(|(_, envelope)| envelope.stream_id == stream_id);
            last
        } else {
            self.read_stream(stream_id).await?
        };

        envelopes.reverse();
        envelopes.truncate(max_count);
        into_records(envelopes)
    }

    async fn insert_events(
        &self,
        stream_id: &str,
        expected_version: AggregateVersion,
        events: Vec<EventData>,
    ) -> EventLogResult<AggregateVersion> {
        let envelopes = self.read_stream(stream_id).await?;
        let actual = envelopes.last().map(|(_, e)| e.event_number).unwrap_or(-1);
        if actual != expected_version.value() {
            return Err(EventLogError::WrongExpectedVersion {
                stream: stream_id.to_string(),
                expected: expected_version.value(),
                actual,
            });
        }

        let subject = self.subjects.stream_subject(stream_id);
        let requested = events.len();

        // Encode everything before the first publish so a bad record never
        // leaves a partial write behind
        let mut payloads = Vec::with_capacity(requested);
        for (offset, event) in events.iter().enumerate() {
            let envelope = StoredRecord::from_event_data(stream_id, actual + 1 + offset as i64, event)?;
            payloads.push((event.event_id, serde_json::to_vec(&envelope)?));
        }

        let mut last_sequence = envelopes.last().map(|(sequence, _)| *sequence).unwrap_or(0);
        let mut event_number = actual;

        for (stored, (event_id, payload)) in payloads.into_iter().enumerate() {
            let publish = Publish::build()
                .payload(payload.into())
                .message_id(event_id.to_string())
                .expected_last_subject_sequence(last_sequence);

            let ack = match self.jetstream.send_publish(subject.clone(), publish).await {
                Ok(ack) => ack.await,
                Err(e) => Err(e),
            };

            match ack {
                Ok(ack) => {
                    last_sequence = ack.sequence;
                    event_number += 1;
                }
                Err(e) if stored > 0 => {
                    tracing::error!(
                        stream = %stream_id,
                        stored,
                        requested,
                        error = %e,
                        "Append failed after a partial write"
                    );
                    return Err(EventLogError::PartialAppend {
                        stream: stream_id.to_string(),
                        stored,
                        requested,
                        reason: e.to_string(),
                    });
                }
                Err(e) if e.to_string().to_lowercase().contains("wrong last sequence") => {
                    let actual = self.current_version(stream_id).await?;
                    tracing::warn!(
                        stream = %stream_id,
                        expected = expected_version.value(),
                        actual,
                        "Concurrent append detected"
                    );
                    return Err(EventLogError::WrongExpectedVersion {
                        stream: stream_id.to_string(),
                        expected: expected_version.value(),
                        actual,
                    });
                }
                Err(e) => return Err(EventLogError::Unavailable(e.to_string())),
            }
        }

        tracing::debug!(stream = %stream_id, version = event_number, "Appended events to JetStream");

        Ok(AggregateVersion::new(event_number))
    }

    async fn read_last_events_from_all(&self, count: usize) -> EventLogResult<Vec<RecordedEvent>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self.stream.clone();
        let last_sequence = stream
            .info()
            .await
            .map_err(|e| EventLogError::Unavailable(e.to_string()))?
            .state
            .last_sequence;
        if last_sequence == 0 {
            return Ok(Vec::new());
        }

        let start_sequence = last_sequence.saturating_sub(count as u64 - 1).max(1);
        let mut envelopes = self
            .read_envelopes(
                self.subjects.build_all(),
                jetstream::consumer::DeliverPolicy::ByStartSequence { start_sequence },
                Some(count),
            )
            .await?;

        envelopes.sort_by_key(|(sequence, _)| std::cmp::Reverse(*sequence));
        into_records(envelopes)
    }
}
