// Copyright (c) 2025 - Cowboy AI, Inc.
//! Apply Handlers
//!
//! Each aggregate type registers one apply function per concrete event type.
//! The table is built once per aggregate type and shared by every instance,
//! so applying an event is a single `TypeId` lookup:
//!
//! ```text
//! apply(event) → TypeId::of(event) → handler(&mut state, &ConcreteEvent)
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::events::{AnyDomainEvent, DomainEvent};

/// Error raised while applying an event to an aggregate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// No apply handler is registered for the event type
    #[error("{aggregate} has no apply handler for {event_type}")]
    Unhandled {
        aggregate: &'static str,
        event_type: String,
    },

    /// The event is not valid for the current state
    #[error("Invalid state for {event_type}: {reason}")]
    InvalidState { event_type: String, reason: String },

    /// Business rule violation
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),
}

type ApplyFn<A> = Box<dyn Fn(&mut A, &dyn AnyDomainEvent) -> Result<(), ApplyError> + Send + Sync>;

/// Apply-function table for one aggregate type
pub struct ApplyHandlers<A> {
    handlers: HashMap<TypeId, ApplyFn<A>>,
}

impl<A: Aggregate> ApplyHandlers<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Build the table registered by `A`
    pub fn for_aggregate() -> Arc<Self> {
        let mut handlers = Self::new();
        A::register_handlers(&mut handlers);
        Arc::new(handlers)
    }

    /// Register the apply function for events of type `E`
    pub fn on<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: DomainEvent,
        F: Fn(&mut A, &E) -> Result<(), ApplyError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            TypeId::of::<E>(),
            Box::new(move |state: &mut A, event: &dyn AnyDomainEvent| match event.as_any().downcast_ref::<E>() {
                Some(event) => handler(state, event),
                None => Err(ApplyError::Unhandled {
                    aggregate: A::TYPE_NAME,
                    event_type: event.concrete_type_name().to_string(),
                }),
            }),
        );
        self
    }

    /// Check whether an apply function exists for the event's type
    pub fn handles(&self, event: &dyn AnyDomainEvent) -> bool {
        self.handlers.contains_key(&event.event_type_id())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn dispatch(&self, state: &mut A, event: &dyn AnyDomainEvent) -> Result<(), ApplyError> {
        match self.handlers.get(&event.event_type_id()) {
            Some(handler) => handler(state, event),
            None => Err(ApplyError::Unhandled {
                aggregate: A::TYPE_NAME,
                event_type: event.event_header().event_type.clone(),
            }),
        }
    }
}

impl<A: Aggregate> Default for ApplyHandlers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for ApplyHandlers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyHandlers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
