// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain Events
//!
//! Events are immutable facts. Every concrete event embeds an [`EventHeader`]
//! (flattened on the wire) and implements [`DomainEvent`]; the blanket
//! [`AnyDomainEvent`] impl lets the subscription and persistence layers carry
//! events of any registered type behind one trait object.
//!
//! # Event Flow
//!
//! ```text
//! Aggregate.apply ─► pending ─► EventDataFactory ─► EventData ─► EventLog
//!                                                                  │
//! handlers ◄─ DomainEventFactory ◄─ TypeRegistry ◄─ RecordedEvent ◄┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use cim_event_sourcing::events::{DomainEvent, EventHeader};
//! use serde::{Deserialize, Serialize};
//! use uuid::Uuid;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct FundsDeposited {
//!     #[serde(flatten)]
//!     header: EventHeader,
//!     amount: i64,
//! }
//!
//! impl DomainEvent for FundsDeposited {
//!     fn header(&self) -> &EventHeader {
//!         &self.header
//!     }
//! }
//!
//! let event = FundsDeposited {
//!     header: EventHeader::new(Uuid::now_v7(), "funds-deposited"),
//!     amount: 10,
//! };
//! assert_eq!(event.event_type(), "funds-deposited");
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod data;
pub mod factory;

pub use data::{EventData, EventDataFactory, WriteMetadata};
pub use factory::DomainEventFactory;

/// Event number of an event that has not been read back from a stream yet
pub const UNASSIGNED_EVENT_NUMBER: i64 = -1;

fn unassigned() -> i64 {
    UNASSIGNED_EVENT_NUMBER
}

/// Common fields carried by every domain event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Aggregate this event belongs to
    pub aggregate_id: Uuid,

    /// Globally unique event ID, the idempotence key
    pub event_id: Uuid,

    /// Registered tag of the concrete event type
    pub event_type: String,

    /// Position in the aggregate stream (assigned when read back)
    #[serde(default = "unassigned")]
    pub event_number: i64,

    /// When the event occurred
    pub event_timestamp: DateTime<Utc>,

    /// Aggregate version the event was raised against
    #[serde(default = "unassigned")]
    pub aggregate_version: i64,

    /// Correlation ID (groups related events across aggregates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Causation ID (immediate cause of this event)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
}

impl EventHeader {
    /// Create a header with a fresh UUID v7 event ID and the current time
    pub fn new(aggregate_id: Uuid, event_type: impl Into<String>) -> Self {
        Self {
            aggregate_id,
            event_id: Uuid::now_v7(),
            event_type: event_type.into(),
            event_number: UNASSIGNED_EVENT_NUMBER,
            event_timestamp: Utc::now(),
            aggregate_version: UNASSIGNED_EVENT_NUMBER,
            correlation_id: None,
            causation_id: None,
        }
    }

    /// Use an explicit event ID (retried commands reuse their ID)
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event_timestamp = timestamp;
        self
    }

    pub fn with_aggregate_version(mut self, version: i64) -> Self {
        self.aggregate_version = version;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid, causation_id: Option<Uuid>) -> Self {
        self.correlation_id = Some(correlation_id);
        self.causation_id = causation_id;
        self
    }
}

/// Trait implemented by every concrete domain event type
pub trait DomainEvent:
    Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    /// Common event fields
    fn header(&self) -> &EventHeader;

    fn aggregate_id(&self) -> Uuid {
        self.header().aggregate_id
    }

    fn event_id(&self) -> Uuid {
        self.header().event_id
    }

    fn event_type(&self) -> &str {
        &self.header().event_type
    }

    fn event_number(&self) -> i64 {
        self.header().event_number
    }
}

/// Object-safe view of a domain event of any concrete type
pub trait AnyDomainEvent: fmt::Debug + Send + Sync {
    /// Common event fields
    fn event_header(&self) -> &EventHeader;

    /// Serialize the complete event to JSON
    fn to_payload(&self) -> serde_json::Result<serde_json::Value>;

    /// `TypeId` of the concrete event type
    fn event_type_id(&self) -> TypeId;

    /// Rust name of the concrete event type (diagnostics only)
    fn concrete_type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

impl<E: DomainEvent> AnyDomainEvent for E {
    fn event_header(&self) -> &EventHeader {
        self.header()
    }

    fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn event_type_id(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn concrete_type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn AnyDomainEvent {
    pub fn event_id(&self) -> Uuid {
        self.event_header().event_id
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.event_header().aggregate_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_header().event_type
    }

    pub fn event_number(&self) -> i64 {
        self.event_header().event_number
    }

    /// Borrow the concrete event if it is an `E`
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Check the concrete event type
    pub fn is<E: DomainEvent>(&self) -> bool {
        self.event_type_id() == TypeId::of::<E>()
    }
}

/// Shared, type-erased domain event
pub type EventRef = Arc<dyn AnyDomainEvent>;

/// Raw record as read back from the event log
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Stream the record was written to (e.g. `Account-<uuid>`)
    pub stream_id: String,

    /// Record key (the domain event ID)
    pub event_id: Uuid,

    /// Registered tag of the payload type
    pub event_type: String,

    /// Position within the stream, starting at 0
    pub event_number: i64,

    /// JSON payload
    pub data: Bytes,

    /// JSON write metadata
    pub metadata: Bytes,

    /// When the record was appended
    pub created: DateTime<Utc>,
}

impl RecordedEvent {
    /// Check whether the record lives on an internal system stream
    pub fn is_system_stream(&self) -> bool {
        self.stream_id.starts_with(crate::SYSTEM_STREAM_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Pinged {
        #[serde(flatten)]
        header: EventHeader,
        count: u32,
    }

    impl DomainEvent for Pinged {
        fn header(&self) -> &EventHeader {
            &self.header
        }
    }

    #[test]
    fn test_header_flattens_into_payload() {
        let aggregate_id = Uuid::now_v7();
        let event = Pinged {
            header: EventHeader::new(aggregate_id, "pinged"),
            count: 3,
        };

        let payload = AnyDomainEvent::to_payload(&event).unwrap();

        assert_eq!(payload["event_type"], "pinged");
        assert_eq!(payload["count"], 3);
        assert_eq!(payload["aggregate_id"], aggregate_id.to_string());
        assert!(payload.get("correlation_id").is_none());
    }

    #[test]
    fn test_missing_positional_fields_default_to_unassigned() {
        let json = serde_json::json!({
            "aggregate_id": Uuid::now_v7(),
            "event_id": Uuid::now_v7(),
            "event_type": "pinged",
            "event_timestamp": Utc::now(),
            "count": 1
        });

        let event: Pinged = serde_json::from_value(json).unwrap();

        assert_eq!(event.event_number(), UNASSIGNED_EVENT_NUMBER);
        assert_eq!(event.header.aggregate_version, UNASSIGNED_EVENT_NUMBER);
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let event: EventRef = Arc::new(Pinged {
            header: EventHeader::new(Uuid::now_v7(), "pinged"),
            count: 7,
        });

        assert!(event.is::<Pinged>());
        assert_eq!(event.downcast_ref::<Pinged>().map(|e| e.count), Some(7));
        assert_eq!(event.event_type(), "pinged");
    }
}
