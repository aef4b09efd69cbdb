// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Data Factory
//!
//! The inverse of [`DomainEventFactory`](super::DomainEventFactory): domain
//! events become wire-ready write records.
//!
//! | Field      | Source                                   |
//! |------------|------------------------------------------|
//! | `event_id` | domain event ID (append idempotence key) |
//! | `event_type` | tag registered for the concrete type   |
//! | `data`     | JSON-serialized event                    |
//! | `metadata` | JSON [`WriteMetadata`]                   |

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::events::{AnyDomainEvent, EventRef};
use crate::registry::TypeRegistry;

/// Content type of every payload written by this crate
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Write record handed to the event log
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    /// Record key (the domain event ID)
    pub event_id: Uuid,

    /// Registered tag of the payload type
    pub event_type: String,

    /// JSON payload
    pub data: Bytes,

    /// JSON write metadata
    pub metadata: Bytes,
}

/// Metadata persisted next to every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteMetadata {
    /// Registered tag of the payload type
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the write record was created
    pub created: DateTime<Utc>,

    #[serde(rename = "content-type")]
    pub content_type: String,

    /// Aggregate-defined metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<serde_json::Value>,
}

/// Builds write records from domain events
#[derive(Debug, Clone)]
pub struct EventDataFactory {
    registry: Arc<TypeRegistry>,
}

impl EventDataFactory {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Build the write record for one event
    pub fn create_event_data(&self, event: Option<&dyn AnyDomainEvent>) -> InfrastructureResult<EventData> {
        self.create_event_data_with_metadata(event, None)
    }

    /// Build the write record for one event, attaching aggregate metadata
    pub fn create_event_data_with_metadata(
        &self,
        event: Option<&dyn AnyDomainEvent>,
        aggregate_metadata: Option<serde_json::Value>,
    ) -> InfrastructureResult<EventData> {
        let event = event.ok_or_else(|| {
            InfrastructureError::NullEvent("cannot build event data without an event".to_string())
        })?;

        let event_type = self
            .registry
            .get_type_name_of(event.event_type_id(), event.concrete_type_name())?
            .to_string();

        let data = serde_json::to_vec(&event.to_payload()?)?;
        let metadata = serde_json::to_vec(&WriteMetadata {
            event_type: event_type.clone(),
            created: Utc::now(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            aggregate: aggregate_metadata,
        })?;

        Ok(EventData {
            event_id: event.event_header().event_id,
            event_type,
            data: Bytes::from(data),
            metadata: Bytes::from(metadata),
        })
    }

    /// Build write records for a batch, preserving order
    pub fn create_event_data_batch(
        &self,
        events: &[EventRef],
        aggregate_metadata: Option<serde_json::Value>,
    ) -> InfrastructureResult<Vec<EventData>> {
        events
            .iter()
            .map(|event| self.create_event_data_with_metadata(Some(event.as_ref()), aggregate_metadata.clone()))
            .collect()
    }
}
