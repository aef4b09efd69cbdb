// Copyright (c) 2025 - Cowboy AI, Inc.
//! Connection lifecycle of a persistent subscription
//!
//! ```text
//!                 Connect
//! Disconnected ───────────► Connected
//!      ▲                        │
//!      └──── Dropped(reason) ───┤
//!      └──── Stopped ───────────┘
//! ```
//!
//! Reconnecting is the worker's job: a dropped subscription is discarded and
//! a fresh one connects on the next poll.

use std::fmt;

use crate::state_machine::{StateMachine, TransitionError, TransitionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionInput {
    /// The client connected to the group
    Connect,
    /// The connection was lost
    Dropped(String),
    /// The subscription was stopped by its owner
    Stopped,
}

impl fmt::Display for ConnectionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionInput::Connect => write!(f, "connect"),
            ConnectionInput::Dropped(reason) => write!(f, "dropped ({})", reason),
            ConnectionInput::Stopped => write!(f, "stopped"),
        }
    }
}

impl StateMachine for ConnectionState {
    type Input = ConnectionInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        match (self, input) {
            (ConnectionState::Disconnected, ConnectionInput::Connect) => Ok((ConnectionState::Connected, ())),
            (ConnectionState::Connected, ConnectionInput::Dropped(_) | ConnectionInput::Stopped) => {
                Ok((ConnectionState::Disconnected, ()))
            }
            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                input: input.to_string(),
            }),
        }
    }
}
