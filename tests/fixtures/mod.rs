// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-event-sourcing
//!
//! A small bank account domain shared by every integration suite:
//!
//! - `Account` aggregate with three events (opened, deposited, withdrawn)
//! - a type registry with the three tags
//! - a recording event handler
//! - an event log wrapper counting port calls
//!
//! Fixed IDs keep assertions readable; event IDs stay UUID v7 unless a test
//! needs a duplicate.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cim_event_sourcing::aggregate::{Aggregate, AggregateVersion, ApplyError, ApplyHandlers};
use cim_event_sourcing::event_store::{EventLog, EventLogError, EventLogResult, InMemoryEventLog};
use cim_event_sourcing::events::{DomainEvent, EventData, EventHeader, EventRef, RecordedEvent};
use cim_event_sourcing::handlers::EventHandler;
use cim_event_sourcing::outcome::{Failure, Outcome};
use cim_event_sourcing::registry::TypeRegistry;

pub const ACCOUNT_ID_1: &str = "01934f4a-1000-7000-8000-000000001000";
pub const ACCOUNT_ID_2: &str = "01934f4a-1000-7000-8000-000000002000";
pub const EVENT_ID_1: &str = "01934f4a-0001-7000-8000-000000000001";

pub const OPENED: &str = "account-opened";
pub const DEPOSITED: &str = "funds-deposited";
pub const WITHDRAWN: &str = "funds-withdrawn";

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

pub fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("Invalid UUID in test fixture")
}

pub fn account_id() -> Uuid {
    parse_uuid(ACCOUNT_ID_1)
}

pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(FIXED_TIMESTAMP)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

// ============================================================================
// Domain
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOpened {
    #[serde(flatten)]
    pub header: EventHeader,
    pub owner: String,
}

impl DomainEvent for AccountOpened {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsDeposited {
    #[serde(flatten)]
    pub header: EventHeader,
    pub amount: i64,
}

impl DomainEvent for FundsDeposited {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsWithdrawn {
    #[serde(flatten)]
    pub header: EventHeader,
    pub amount: i64,
}

impl DomainEvent for FundsWithdrawn {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// Registered, but no `Account` apply function handles it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementPrinted {
    #[serde(flatten)]
    pub header: EventHeader,
}

impl DomainEvent for StatementPrinted {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub owner: Option<String>,
    pub balance: i64,
    pub deposits: usize,
}

impl Aggregate for Account {
    const TYPE_NAME: &'static str = "Account";

    fn register_handlers(handlers: &mut ApplyHandlers<Self>) {
        handlers
            .on::<AccountOpened, _>(|account, event| {
                if account.owner.is_some() {
                    return Err(ApplyError::InvalidState {
                        event_type: OPENED.to_string(),
                        reason: "account already open".to_string(),
                    });
                }
                account.owner = Some(event.owner.clone());
                Ok(())
            })
            .on::<FundsDeposited, _>(|account, event| {
                account.balance += event.amount;
                account.deposits += 1;
                Ok(())
            })
            .on::<FundsWithdrawn, _>(|account, event| {
                if event.amount > account.balance {
                    return Err(ApplyError::BusinessRuleViolation(format!(
                        "cannot withdraw {} from a balance of {}",
                        event.amount, account.balance
                    )));
                }
                account.balance -= event.amount;
                Ok(())
            });
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        self.owner.as_ref().map(|owner| serde_json::json!({ "owner": owner }))
    }
}

pub fn opened(aggregate_id: Uuid, owner: &str) -> AccountOpened {
    AccountOpened {
        header: EventHeader::new(aggregate_id, OPENED).with_timestamp(fixed_timestamp()),
        owner: owner.to_string(),
    }
}

pub fn deposited(aggregate_id: Uuid, amount: i64) -> FundsDeposited {
    FundsDeposited {
        header: EventHeader::new(aggregate_id, DEPOSITED).with_timestamp(fixed_timestamp()),
        amount,
    }
}

pub fn withdrawn(aggregate_id: Uuid, amount: i64) -> FundsWithdrawn {
    FundsWithdrawn {
        header: EventHeader::new(aggregate_id, WITHDRAWN).with_timestamp(fixed_timestamp()),
        amount,
    }
}

pub fn statement_printed(aggregate_id: Uuid) -> StatementPrinted {
    StatementPrinted {
        header: EventHeader::new(aggregate_id, "statement-printed"),
    }
}

pub fn registry() -> Arc<TypeRegistry> {
    TypeRegistry::builder()
        .add_type::<AccountOpened>(OPENED)
        .unwrap()
        .add_type::<FundsDeposited>(DEPOSITED)
        .unwrap()
        .add_type::<FundsWithdrawn>(WITHDRAWN)
        .unwrap()
        .add_type::<StatementPrinted>("statement-printed")
        .unwrap()
        .build()
}

/// Raw log record of an event at a stream position
pub fn recorded<E: DomainEvent>(stream_id: &str, event_number: i64, tag: &str, event: &E) -> RecordedEvent {
    RecordedEvent {
        stream_id: stream_id.to_string(),
        event_id: event.header().event_id,
        event_type: tag.to_string(),
        event_number,
        data: Bytes::from(serde_json::to_vec(event).unwrap()),
        metadata: Bytes::new(),
        created: fixed_timestamp(),
    }
}

/// Raw write record with an arbitrary tag and payload
pub fn raw_event_data(tag: &str, payload: &[u8]) -> EventData {
    EventData {
        event_id: Uuid::now_v7(),
        event_type: tag.to_string(),
        data: Bytes::copy_from_slice(payload),
        metadata: Bytes::new(),
    }
}

// ============================================================================
// Event handler
// ============================================================================

/// Records every event it sees; can be told to fail or to take its time
pub struct RecordingHandler {
    name: String,
    seen: Mutex<Vec<EventRef>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Arc<Self> {
        Self::build(name, None)
    }

    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Self::build(name, Some(delay))
    }

    fn build(name: &str, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn seen(&self) -> Vec<EventRef> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_ids(&self) -> Vec<Uuid> {
        self.seen().iter().map(|event| event.event_id()).collect()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Highest number of concurrent `handle` calls observed
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: EventRef) -> Outcome<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.seen.lock().unwrap().push(event);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            Err(Failure::error("projection store rejected the write"))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Event log
// ============================================================================

/// In-memory log counting port calls, optionally unavailable
///
/// With `partial_appends` set, an insert stores only its first record and
/// reports the rest as lost, the way a per-record publisher fails mid-batch.
#[derive(Default)]
pub struct CountingLog {
    pub inner: InMemoryEventLog,
    pub reads: AtomicUsize,
    pub backward_reads: AtomicUsize,
    pub inserts: AtomicUsize,
    pub unavailable: AtomicBool,
    pub partial_appends: AtomicBool,
}

impl CountingLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn backward_reads(&self) -> usize {
        self.backward_reads.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_partial_appends(&self, partial: bool) {
        self.partial_appends.store(partial, Ordering::SeqCst);
    }

    fn check(&self) -> EventLogResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EventLogError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventLog for CountingLog {
    async fn read_events(&self, stream_id: &str, from_version: i64) -> EventLogResult<Vec<RecordedEvent>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.read_events(stream_id, from_version).await
    }

    async fn get_events_backward(&self, stream_id: &str, max_count: usize) -> EventLogResult<Vec<RecordedEvent>> {
        self.backward_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get_events_backward(stream_id, max_count).await
    }

    async fn insert_events(
        &self,
        stream_id: &str,
        expected_version: AggregateVersion,
        events: Vec<EventData>,
    ) -> EventLogResult<AggregateVersion> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.partial_appends.load(Ordering::SeqCst) && events.len() > 1 {
            let requested = events.len();
            let first = events.into_iter().take(1).collect();
            self.inner.insert_events(stream_id, expected_version, first).await?;
            return Err(EventLogError::PartialAppend {
                stream: stream_id.to_string(),
                stored: 1,
                requested,
                reason: "publish timed out".to_string(),
            });
        }
        self.inner.insert_events(stream_id, expected_version, events).await
    }

    async fn read_last_events_from_all(&self, count: usize) -> EventLogResult<Vec<RecordedEvent>> {
        self.check()?;
        self.inner.read_last_events_from_all(count).await
    }
}

// ============================================================================
// Async helpers
// ============================================================================

/// Route crate logs to the test writer; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `check` every 10ms until it holds, panicking after 10s
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..1000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", what);
}
