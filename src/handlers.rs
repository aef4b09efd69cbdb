// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Handlers
//!
//! Subscriptions hand decoded events to handlers chosen by event tag. The
//! mapping is static: each handler name lists the tags it wants, and a
//! factory turns names into handler instances once, at construction.
//!
//! ```text
//! { "BalanceProjector": ["funds-deposited", "funds-withdrawn"],
//!   "AuditTrail":       ["funds-withdrawn"] }
//!
//! funds-withdrawn ──► [BalanceProjector, AuditTrail] ──► dispatch_to_handlers
//! ```
//!
//! A handler name the factory cannot build fails construction immediately.
//! An event nobody subscribed to is a `NotFound` outcome, not an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::events::EventRef;
use crate::outcome::{Failure, FailureKind, Outcome};

/// Reacts to domain events delivered by a subscription
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name used in logs
    fn name(&self) -> &str;

    async fn handle(&self, event: EventRef) -> Outcome<()>;
}

/// Resolves the handlers interested in an event's tag
#[derive(Clone)]
pub struct EventHandlerResolver {
    by_tag: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl EventHandlerResolver {
    /// Build the resolver, instantiating every configured handler once
    ///
    /// Fails with [`InfrastructureError::HandlerNotResolvable`] for the first
    /// handler name the factory returns `None` for.
    pub fn new<F>(handler_tags: HashMap<String, Vec<String>>, factory: F) -> InfrastructureResult<Self>
    where
        F: Fn(&str) -> Option<Arc<dyn EventHandler>>,
    {
        let mut names: Vec<&String> = handler_tags.keys().collect();
        names.sort();

        let mut by_tag: HashMap<String, Vec<Arc<dyn EventHandler>>> = HashMap::new();
        for name in names {
            let handler = factory(name).ok_or_else(|| InfrastructureError::HandlerNotResolvable(name.clone()))?;

            for tag in &handler_tags[name] {
                by_tag.entry(tag.clone()).or_default().push(handler.clone());
            }
        }

        tracing::debug!(
            handlers = handler_tags.len(),
            tags = by_tag.len(),
            "Event handler resolver built"
        );

        Ok(Self { by_tag })
    }

    /// Handlers configured for the event's tag
    pub fn get_domain_event_handlers(&self, event: &EventRef) -> Outcome<Vec<Arc<dyn EventHandler>>> {
        match self.by_tag.get(event.event_type()) {
            Some(handlers) if !handlers.is_empty() => Ok(handlers.clone()),
            _ => Err(Failure::not_found(format!(
                "No event handler configured for '{}'",
                event.event_type()
            ))),
        }
    }

    /// Tags with at least one handler
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }
}

impl fmt::Debug for EventHandlerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.by_tag.keys().collect();
        tags.sort();
        f.debug_struct("EventHandlerResolver").field("tags", &tags).finish()
    }
}

/// Run every handler in order and aggregate their failures
///
/// All handlers run even when an earlier one fails.
pub async fn dispatch_to_handlers(event: EventRef, handlers: &[Arc<dyn EventHandler>]) -> Outcome<()> {
    let mut errors = Vec::new();

    for handler in handlers {
        if let Err(failure) = handler.handle(event.clone()).await {
            tracing::warn!(
                handler = handler.name(),
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                error = %failure,
                "Event handler failed"
            );
            errors.extend(
                failure
                    .errors
                    .into_iter()
                    .map(|error| format!("{}: {}", handler.name(), error)),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Failure::with_errors(FailureKind::Error, errors))
    }
}
