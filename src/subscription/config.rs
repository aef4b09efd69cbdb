// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription worker configuration
//!
//! One entry per logical pool. Entries are plain serde structs so the host
//! application can load them from whatever configuration source it uses:
//!
//! ```json
//! [
//!   { "pool": "Ordered", "is_ordered": true, "groups_to_include": "Ledger" },
//!   { "pool": "Main", "instance_count": 2, "groups_to_ignore": "Ledger" }
//! ]
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inflight window of concurrent pools unless configured otherwise
pub const DEFAULT_INFLIGHT_MESSAGES: usize = 200;

/// Seconds between two catalog polls
pub const DEFAULT_POLLING_INTERVAL_SECONDS: u64 = 60;

/// Logical handler pool a config entry draws its resolver from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerPool {
    /// Strictly sequential processing
    Ordered,
    /// Concurrent processing
    Main,
    /// Domain-only handlers
    Domain,
}

impl fmt::Display for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPool::Ordered => write!(f, "Ordered"),
            WorkerPool::Main => write!(f, "Main"),
            WorkerPool::Domain => write!(f, "Domain"),
        }
    }
}

/// Configuration of one worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionWorkerConfig {
    pub pool: WorkerPool,

    pub enabled: bool,

    /// Process one message at a time on a single connection
    pub is_ordered: bool,

    /// Competing connections per subscription (ignored when ordered)
    pub instance_count: usize,

    /// Unacknowledged messages allowed per connection (forced to 1 when ordered)
    pub inflight_messages: Option<usize>,

    pub polling_interval_seconds: u64,

    /// Comma-separated group name substrings to keep
    pub groups_to_include: Option<String>,

    /// Comma-separated group name substrings to drop
    pub groups_to_ignore: Option<String>,

    /// Comma-separated stream name substrings to keep
    pub streams_to_include: Option<String>,

    /// Comma-separated stream name substrings to drop
    pub streams_to_ignore: Option<String>,
}

impl Default for SubscriptionWorkerConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPool::Main,
            enabled: true,
            is_ordered: false,
            instance_count: 1,
            inflight_messages: None,
            polling_interval_seconds: DEFAULT_POLLING_INTERVAL_SECONDS,
            groups_to_include: None,
            groups_to_ignore: None,
            streams_to_include: None,
            streams_to_ignore: None,
        }
    }
}

impl SubscriptionWorkerConfig {
    /// Ordered single-connection pool
    pub fn ordered() -> Self {
        Self {
            pool: WorkerPool::Ordered,
            is_ordered: true,
            ..Self::default()
        }
    }

    /// Concurrent pool with `instance_count` competing connections
    pub fn concurrent(pool: WorkerPool, instance_count: usize) -> Self {
        Self {
            pool,
            instance_count,
            ..Self::default()
        }
    }

    pub fn with_polling_interval(mut self, seconds: u64) -> Self {
        self.polling_interval_seconds = seconds;
        self
    }

    pub fn with_inflight_messages(mut self, inflight_messages: usize) -> Self {
        self.inflight_messages = Some(inflight_messages);
        self
    }

    pub fn with_group_filters(mut self, include: Option<&str>, ignore: Option<&str>) -> Self {
        self.groups_to_include = include.map(str::to_string);
        self.groups_to_ignore = ignore.map(str::to_string);
        self
    }

    pub fn with_stream_filters(mut self, include: Option<&str>, ignore: Option<&str>) -> Self {
        self.streams_to_include = include.map(str::to_string);
        self.streams_to_ignore = ignore.map(str::to_string);
        self
    }

    /// Inflight window actually used per connection
    pub fn effective_inflight_messages(&self) -> usize {
        if self.is_ordered {
            1
        } else {
            self.inflight_messages.unwrap_or(DEFAULT_INFLIGHT_MESSAGES).max(1)
        }
    }

    /// Number of worker instances this entry yields
    pub fn effective_instance_count(&self) -> usize {
        if self.is_ordered {
            1
        } else {
            self.instance_count.max(1)
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: SubscriptionWorkerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, SubscriptionWorkerConfig::default());
        assert_eq!(config.effective_inflight_messages(), 200);
        assert_eq!(config.polling_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_ordered_forces_single_inflight_and_instance() {
        let config: SubscriptionWorkerConfig = serde_json::from_value(serde_json::json!({
            "pool": "Ordered",
            "is_ordered": true,
            "instance_count": 4,
            "inflight_messages": 50
        }))
        .unwrap();

        assert_eq!(config.effective_inflight_messages(), 1);
        assert_eq!(config.effective_instance_count(), 1);
    }

    #[test]
    fn test_concurrent_overrides() {
        let config = SubscriptionWorkerConfig::concurrent(WorkerPool::Domain, 3).with_inflight_messages(10);

        assert_eq!(config.effective_inflight_messages(), 10);
        assert_eq!(config.effective_instance_count(), 3);
        assert_eq!(config.pool.to_string(), "Domain");
    }
}
