// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for Event-Sourced Aggregates
//!
//! Application-facing façade over the aggregate repositories.
//!
//! # Architecture
//!
//! ```text
//! Client Request
//!     ↓
//! AggregateService (this module) ──► Cache (opted-in types only)
//!     ↓
//! AggregateRepository<A>
//!     ↓
//! EventLog (in-memory or NATS JetStream)
//! ```
//!
//! Every operation returns an [`Outcome`](crate::outcome::Outcome); store
//! failures, concurrency conflicts and replay errors never escape as panics.
//!
//! # Example
//!
//! ```rust,ignore
//! let service = AggregateService::new(log, registry, Arc::new(InMemoryCache::new()));
//! service.add_cached_aggregate::<Account>(None).await;
//!
//! let mut account = service.get::<Account>(account_id).await?;
//! account.apply(deposited)?;
//! service.save(&mut account).await?;
//! ```

pub mod aggregate;

pub use aggregate::AggregateService;
