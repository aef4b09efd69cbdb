// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for event log streams
//!
//! Aggregate streams are named `"{Category}-{id}"`. On NATS every stream is
//! one subject, split at the first `-`:
//!
//! ```text
//! Account-0190c7a1-...   →   events.Account.0190c7a1-...
//! ```
//!
//! This allows for:
//! - Exact stream reads (`events.Account.<id>`)
//! - Category subscriptions (`events.Account.>`)
//! - Global subscriptions (`events.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_event_sourcing::subjects::SubjectBuilder;
//!
//! let subjects = SubjectBuilder::new("events");
//! assert_eq!(subjects.stream_subject("Account-42"), "events.Account.42");
//! assert_eq!(subjects.subscription_filter("$ce-Account"), "events.Account.>");
//! assert_eq!(subjects.build_all(), "events.>");
//! ```

/// Default root namespace for event log subjects
pub const DEFAULT_SUBJECT_PREFIX: &str = "events";

/// Stream name that subscribes to every stream
pub const ALL_STREAMS: &str = "$all";

/// Prefix of category projection stream names
pub const CATEGORY_STREAM_PREFIX: &str = "$ce-";

/// Builder for event log NATS subjects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectBuilder {
    prefix: String,
}

impl SubjectBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Subject a stream's records are published on
    pub fn stream_subject(&self, stream_id: &str) -> String {
        match stream_id.split_once('-') {
            Some((category, id)) if !category.is_empty() && !id.is_empty() => {
                format!("{}.{}.{}", self.prefix, token(category), token(id))
            }
            _ => format!("{}.{}._", self.prefix, token(stream_id)),
        }
    }

    /// Subject filter for a persistent subscription on `stream_name`
    ///
    /// `$all` subscribes to everything, `$ce-{Category}` to one category, a
    /// bare category name to that category and any other name to one stream.
    pub fn subscription_filter(&self, stream_name: &str) -> String {
        if stream_name == ALL_STREAMS {
            return self.build_all();
        }
        if let Some(category) = stream_name.strip_prefix(CATEGORY_STREAM_PREFIX) {
            return format!("{}.{}.>", self.prefix, token(category));
        }
        if stream_name.contains('-') {
            return self.stream_subject(stream_name);
        }
        format!("{}.{}.>", self.prefix, token(stream_name))
    }

    /// Subscription for every stream of the log
    pub fn build_all(&self) -> String {
        format!("{}.>", self.prefix)
    }
}

impl Default for SubjectBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SUBJECT_PREFIX)
    }
}

/// Make a string usable as a single subject token
fn token(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
