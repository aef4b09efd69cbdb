// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event log liveness probe
//!
//! Reads the newest record of the whole log. A log that answers within the
//! timeout is healthy, even when it is empty.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::event_store::EventLog;

/// Probe timeout when none is given
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub latency: Duration,
    /// ID and stream of the newest record, if the log is not empty
    pub last_event: Option<(Uuid, String)>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Probe an event log
pub async fn probe_event_log(log: &dyn EventLog, timeout: Duration) -> HealthReport {
    let checked_at = Utc::now();
    let started = Instant::now();

    let (status, last_event) = match tokio::time::timeout(timeout, log.read_last_events_from_all(1)).await {
        Ok(Ok(records)) => (
            HealthStatus::Healthy,
            records.into_iter().next().map(|r| (r.event_id, r.stream_id)),
        ),
        Ok(Err(e)) => (HealthStatus::Unhealthy(e.to_string()), None),
        Err(_) => (
            HealthStatus::Unhealthy(format!("no answer within {:?}", timeout)),
            None,
        ),
    };

    let latency = started.elapsed();
    match &status {
        HealthStatus::Healthy => tracing::debug!(latency_ms = latency.as_millis() as u64, "Event log healthy"),
        HealthStatus::Unhealthy(reason) => tracing::warn!(reason = %reason, "Event log unhealthy"),
    }

    HealthReport {
        status,
        checked_at,
        latency,
        last_event,
    }
}
