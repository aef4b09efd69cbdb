// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Type Registry
//!
//! Bidirectional mapping between concrete domain event types and the short
//! string tags used on the wire. The registry is assembled once at startup
//! with [`TypeRegistryBuilder`] and then frozen; the built [`TypeRegistry`] is
//! immutable and shared between the event factories and every subscription
//! task behind an `Arc`.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = TypeRegistry::builder()
//!     .add_type::<AccountOpened>("account-opened")?
//!     .add_type::<FundsDeposited>("funds-deposited")?
//!     .build();
//!
//! assert_eq!(registry.get_type_name::<FundsDeposited>()?, "funds-deposited");
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{InfrastructureError, InfrastructureResult};
use crate::events::{DomainEvent, EventRef};

type DecodeFn = fn(serde_json::Value) -> serde_json::Result<EventRef>;

fn decode_as<E: DomainEvent>(value: serde_json::Value) -> serde_json::Result<EventRef> {
    let event: E = serde_json::from_value(value)?;
    Ok(Arc::new(event))
}

/// A concrete event type known to the registry
#[derive(Clone)]
pub struct RegisteredType {
    tag: String,
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
}

impl RegisteredType {
    /// Wire tag of the type
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust name of the type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Deserialize a JSON value into this concrete type
    pub fn decode(&self, value: serde_json::Value) -> serde_json::Result<EventRef> {
        (self.decode)(value)
    }
}

impl fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredType")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Builder collecting type registrations before the registry is frozen
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    by_tag: HashMap<String, RegisteredType>,
    by_type: HashMap<TypeId, String>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `E` under `tag`
    ///
    /// Registering the same pair twice is a no-op. Binding a tag to a second
    /// type, or a type to a second tag, is rejected.
    pub fn add_type<E: DomainEvent>(mut self, tag: impl Into<String>) -> InfrastructureResult<Self> {
        let tag = tag.into();
        let type_id = TypeId::of::<E>();
        let type_name = std::any::type_name::<E>();

        if let Some(existing) = self.by_tag.get(&tag) {
            if existing.type_id == type_id {
                return Ok(self);
            }
            return Err(InfrastructureError::DuplicateTypeTag {
                tag,
                existing: existing.type_name.to_string(),
            });
        }

        if let Some(existing) = self.by_type.get(&type_id) {
            return Err(InfrastructureError::DuplicateType {
                type_name: type_name.to_string(),
                existing: existing.clone(),
            });
        }

        self.by_type.insert(type_id, tag.clone());
        self.by_tag.insert(
            tag.clone(),
            RegisteredType {
                tag,
                type_id,
                type_name,
                decode: decode_as::<E>,
            },
        );

        Ok(self)
    }

    /// Freeze the registrations into a shareable registry
    pub fn build(self) -> Arc<TypeRegistry> {
        tracing::debug!(types = self.by_tag.len(), "Event type registry built");
        Arc::new(TypeRegistry {
            by_tag: self.by_tag,
            by_type: self.by_type,
        })
    }
}

/// Immutable tag ↔ type mapping
#[derive(Debug)]
pub struct TypeRegistry {
    by_tag: HashMap<String, RegisteredType>,
    by_type: HashMap<TypeId, String>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// Resolve the concrete type registered for `tag`
    pub fn get_type(&self, tag: &str) -> InfrastructureResult<&RegisteredType> {
        self.by_tag
            .get(tag)
            .ok_or_else(|| InfrastructureError::TypeNotFound(tag.to_string()))
    }

    /// Tag registered for `E`
    pub fn get_type_name<E: DomainEvent>(&self) -> InfrastructureResult<&str> {
        self.by_type
            .get(&TypeId::of::<E>())
            .map(String::as_str)
            .ok_or_else(|| {
                InfrastructureError::TypeNotRegistered(std::any::type_name::<E>().to_string())
            })
    }

    /// Tag registered for the type behind `type_id`
    ///
    /// `type_name` is only used for the error message.
    pub fn get_type_name_of(&self, type_id: TypeId, type_name: &str) -> InfrastructureResult<&str> {
        self.by_type
            .get(&type_id)
            .map(String::as_str)
            .ok_or_else(|| InfrastructureError::TypeNotRegistered(type_name.to_string()))
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}
