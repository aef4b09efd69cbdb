// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-Sourced Aggregates
//!
//! An aggregate is a consistency boundary rebuilt by replaying its events.
//! [`AggregateRoot`] owns the bookkeeping every aggregate shares (identity,
//! version, committed history, pending events); the aggregate type itself
//! only holds domain state and registers how each event changes it.
//!
//! # Lifecycle
//!
//! ```text
//! new(id)            version -1, no history, no pending
//!   │ apply(event)   duplicate ids are ignored, failures roll back
//!   ▼
//! pending events ──save──► EventLog ──commit_pending_events──► history
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! impl Aggregate for Account {
//!     const TYPE_NAME: &'static str = "Account";
//!
//!     fn register_handlers(handlers: &mut ApplyHandlers<Self>) {
//!         handlers
//!             .on::<AccountOpened, _>(|account, event| {
//!                 account.owner = event.owner.clone();
//!                 Ok(())
//!             })
//!             .on::<FundsDeposited, _>(|account, event| {
//!                 account.balance += event.amount;
//!                 Ok(())
//!             });
//!     }
//! }
//!
//! let mut account = AggregateRoot::<Account>::new(account_id);
//! account.apply(deposited)?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::events::{DomainEvent, EventRef};

pub mod handlers;
pub mod version;

pub use handlers::{ApplyError, ApplyHandlers};
pub use version::AggregateVersion;

/// Domain state of an event-sourced aggregate
pub trait Aggregate: Default + Clone + fmt::Debug + Send + Sync + 'static {
    /// Type name used for stream names and cache keys
    const TYPE_NAME: &'static str;

    /// Register one apply function per handled event type
    fn register_handlers(handlers: &mut ApplyHandlers<Self>);

    /// Metadata persisted alongside every event written for this aggregate
    fn metadata(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Stream name of an aggregate instance
pub fn stream_name<A: Aggregate>(aggregate_id: Uuid) -> String {
    format!("{}-{}", A::TYPE_NAME, aggregate_id)
}

/// Aggregate bookkeeping around the domain state `A`
#[derive(Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: Uuid,
    version: AggregateVersion,
    history: Vec<EventRef>,
    pending: Vec<EventRef>,
    seen: HashSet<Uuid>,
    state: A,
    handlers: Arc<ApplyHandlers<A>>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Create a brand-new aggregate
    pub fn new(id: Uuid) -> Self {
        Self::with_handlers(id, ApplyHandlers::<A>::for_aggregate())
    }

    /// Create a brand-new aggregate sharing an existing handler table
    pub fn with_handlers(id: Uuid, handlers: Arc<ApplyHandlers<A>>) -> Self {
        Self {
            id,
            version: AggregateVersion::NEW,
            history: Vec::new(),
            pending: Vec::new(),
            seen: HashSet::new(),
            state: A::default(),
            handlers,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Version of the stream head this aggregate was loaded from
    pub fn version(&self) -> AggregateVersion {
        self.version
    }

    /// Current domain state
    pub fn state(&self) -> &A {
        &self.state
    }

    pub fn stream_name(&self) -> String {
        stream_name::<A>(self.id)
    }

    /// Apply a typed event
    ///
    /// `None` and already-seen event IDs are silently ignored. If the apply
    /// function fails the state is rolled back and the error returned.
    pub fn apply<E: DomainEvent>(&mut self, event: impl Into<Option<E>>) -> Result<(), ApplyError> {
        match event.into() {
            Some(event) => self.apply_shared(Arc::new(event)),
            None => Ok(()),
        }
    }

    /// Apply an already type-erased event
    pub fn apply_shared(&mut self, event: EventRef) -> Result<(), ApplyError> {
        let event_id = event.event_id();
        if self.is_event_duplicate(event_id) {
            tracing::debug!(
                aggregate = A::TYPE_NAME,
                aggregate_id = %self.id,
                event_id = %event_id,
                "Duplicate event ignored"
            );
            return Ok(());
        }

        let snapshot = self.state.clone();
        if let Err(error) = self.handlers.dispatch(&mut self.state, event.as_ref()) {
            self.state = snapshot;
            return Err(error);
        }

        self.seen.insert(event_id);
        self.pending.push(event);
        Ok(())
    }

    /// Snapshot of the committed events
    pub fn historical_events(&self) -> Vec<EventRef> {
        self.history.clone()
    }

    /// Snapshot of the events applied since load
    pub fn pending_events(&self) -> Vec<EventRef> {
        self.pending.clone()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Move pending events into history
    ///
    /// Called by the repository once the events are persisted.
    pub fn commit_pending_events(&mut self) {
        self.history.append(&mut self.pending);
    }

    /// Check whether an event ID was already applied
    pub fn is_event_duplicate(&self, event_id: Uuid) -> bool {
        self.seen.contains(&event_id)
    }

    /// Aggregate-defined metadata persisted with new events
    pub fn aggregate_metadata(&self) -> Option<serde_json::Value> {
        self.state.metadata()
    }

    pub(crate) fn set_version(&mut self, version: AggregateVersion) {
        self.version = version;
    }
}

impl<A: Aggregate> fmt::Debug for AggregateRoot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("type", &A::TYPE_NAME)
            .field("id", &self.id)
            .field("version", &self.version)
            .field("history", &self.history.len())
            .field("pending", &self.pending.len())
            .field("state", &self.state)
            .finish()
    }
}
