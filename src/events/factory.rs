// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain Event Factory
//!
//! Turns raw log records back into typed domain events:
//!
//! ```text
//! RecordedEvent ──tag──► TypeRegistry ──RegisteredType──► decode ──► EventRef
//! ```
//!
//! Unknown tags and malformed payloads are hard errors. A batch fails as a
//! whole when any of its records fails.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::events::{DomainEvent, EventRef, RecordedEvent};
use crate::registry::{RegisteredType, TypeRegistry};

/// Decodes raw records into domain events through the type registry
#[derive(Debug, Clone)]
pub struct DomainEventFactory {
    registry: Arc<TypeRegistry>,
}

impl DomainEventFactory {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Deserialize a raw JSON payload into the statically known type `E`
    pub fn create_domain_event_as<E: DomainEvent>(&self, raw_json: &[u8]) -> InfrastructureResult<E> {
        serde_json::from_slice(raw_json).map_err(|e| {
            InfrastructureError::Deserialization(format!(
                "{}: {}",
                std::any::type_name::<E>(),
                e
            ))
        })
    }

    /// Deserialize a raw JSON payload into a type resolved at runtime
    pub fn create_domain_event_of(
        &self,
        raw_json: &[u8],
        event_type: &RegisteredType,
    ) -> InfrastructureResult<EventRef> {
        let value: Value = serde_json::from_slice(raw_json)
            .map_err(|e| InfrastructureError::Deserialization(format!("{}: {}", event_type.tag(), e)))?;

        event_type
            .decode(value)
            .map_err(|e| InfrastructureError::Deserialization(format!("{}: {}", event_type.tag(), e)))
    }

    /// Decode one log record
    ///
    /// The record's position and the aggregate ID overlay the payload, so the
    /// decoded header reflects where the event actually lives in the stream.
    pub fn create_domain_event(
        &self,
        aggregate_id: Uuid,
        record: &RecordedEvent,
    ) -> InfrastructureResult<EventRef> {
        let event_type = self.registry.get_type(&record.event_type)?;

        let mut value: Value = serde_json::from_slice(&record.data).map_err(|e| {
            InfrastructureError::Deserialization(format!(
                "{} #{} ({}): {}",
                record.stream_id, record.event_number, record.event_type, e
            ))
        })?;

        if let Value::Object(fields) = &mut value {
            fields.insert("event_number".to_string(), Value::from(record.event_number));
            fields
                .entry("aggregate_id")
                .or_insert_with(|| Value::String(aggregate_id.to_string()));
            fields
                .entry("event_id")
                .or_insert_with(|| Value::String(record.event_id.to_string()));
            fields
                .entry("event_type")
                .or_insert_with(|| Value::String(record.event_type.clone()));
        }

        event_type.decode(value).map_err(|e| {
            InfrastructureError::Deserialization(format!(
                "{} #{} ({}): {}",
                record.stream_id, record.event_number, record.event_type, e
            ))
        })
    }

    /// Decode a batch of records, preserving order
    pub fn create_domain_events(
        &self,
        aggregate_id: Uuid,
        records: &[RecordedEvent],
    ) -> InfrastructureResult<Vec<EventRef>> {
        records
            .iter()
            .map(|record| self.create_domain_event(aggregate_id, record))
            .collect()
    }
}
