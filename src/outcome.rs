// Copyright (c) 2025 - Cowboy AI, Inc.
//! Explicit outcomes for expected failure paths
//!
//! Loading, saving and dispatching can fail for ordinary reasons: a
//! concurrent writer, a store that is down, an event nobody listens to. Those
//! outcomes are values, never panics or hard errors:
//!
//! ```text
//! Outcome<T> = Result<T, Failure>
//!                         │
//!                         ├── kind:   FailureKind (Invalid, Conflict, ...)
//!                         └── errors: every message collected on the way
//! ```

use std::fmt;

/// Classification of an expected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The input was rejected
    Invalid,
    /// The caller is not authenticated
    Unauthorized,
    /// The caller may not perform the operation
    Forbidden,
    /// Nothing exists for the request
    NotFound,
    /// Optimistic concurrency clash on save
    Conflict,
    /// The backing store failed internally
    CriticalError,
    /// Catch-all failure
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Invalid => write!(f, "invalid"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::Forbidden => write!(f, "forbidden"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::Conflict => write!(f, "conflict"),
            FailureKind::CriticalError => write!(f, "critical error"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// Failure value carried by [`Outcome`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {}", .errors.join("; "))]
pub struct Failure {
    /// What kind of failure occurred
    pub kind: FailureKind,

    /// Accumulated error messages, in the order they were raised
    pub errors: Vec<String>,
}

/// Result type for operations with expected failure paths
pub type Outcome<T> = Result<T, Failure>;

impl Failure {
    /// Create a failure with a single message
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            errors: vec![message.into()],
        }
    }

    /// Create a failure carrying several messages
    pub fn with_errors(kind: FailureKind, errors: Vec<String>) -> Self {
        Self { kind, errors }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Invalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Conflict, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(FailureKind::CriticalError, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Error, message)
    }

    /// Check the failure kind
    pub fn is(&self, kind: FailureKind) -> bool {
        self.kind == kind
    }
}
