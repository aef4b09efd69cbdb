// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for infrastructure operations
//!
//! These are the hard failures: programmer or deployment mistakes such as an
//! unmapped event tag, a malformed payload or a handler the factory cannot
//! build. Expected business outcomes travel through [`crate::outcome`] instead.

use thiserror::Error;

/// Errors that can occur in infrastructure operations
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// No concrete type is registered for the tag
    #[error("Type not found for event tag '{0}'")]
    TypeNotFound(String),

    /// The concrete type was never registered
    #[error("Type '{0}' is not registered")]
    TypeNotRegistered(String),

    /// The tag is already bound to another concrete type
    #[error("Event tag '{tag}' is already registered for type '{existing}'")]
    DuplicateTypeTag { tag: String, existing: String },

    /// The concrete type is already bound to another tag
    #[error("Type '{type_name}' is already registered with tag '{existing}'")]
    DuplicateType { type_name: String, existing: String },

    /// An event argument was required but none was given
    #[error("Event must not be empty: {0}")]
    NullEvent(String),

    /// A configured event handler could not be created by the factory
    #[error("Event handler '{0}' could not be resolved")]
    HandlerNotResolvable(String),

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS subscribe error
    #[error("NATS subscribe error: {0}")]
    NatsSubscribe(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for infrastructure operations
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

#[cfg(feature = "nats")]
impl From<async_nats::Error> for InfrastructureError {
    fn from(err: async_nats::Error) -> Self {
        InfrastructureError::NatsConnection(err.to_string())
    }
}

impl From<serde_json::Error> for InfrastructureError {
    fn from(err: serde_json::Error) -> Self {
        InfrastructureError::Serialization(err.to_string())
    }
}
