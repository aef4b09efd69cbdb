// Copyright (c) 2025 - Cowboy AI, Inc.
//! Aggregate version
//!
//! The version is the event number of the newest event in the aggregate
//! stream; `-1` marks an aggregate without any events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Signed 64-bit aggregate version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateVersion(i64);

impl AggregateVersion {
    /// Version of an aggregate with no events yet
    pub const NEW: AggregateVersion = AggregateVersion(-1);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn is_new(self) -> bool {
        self == Self::NEW
    }

    /// Version after `count` more events are appended
    pub fn advanced_by(self, count: usize) -> Self {
        Self(self.0 + count as i64)
    }
}

impl Default for AggregateVersion {
    fn default() -> Self {
        Self::NEW
    }
}

impl From<i64> for AggregateVersion {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<AggregateVersion> for i64 {
    fn from(version: AggregateVersion) -> Self {
        version.0
    }
}

impl fmt::Display for AggregateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
