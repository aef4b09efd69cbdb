// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Small, pure state machine types used to model connection lifecycles.
//! Transitions are deterministic functions of `(state, input)`; side effects
//! (connecting, acking, logging) stay in the caller.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! [`StateMachineWithHistory`] records every accepted transition with its
//! timestamp so a subscription can report how often it dropped and when.
//!
//! # Example
//!
//! ```rust,ignore
//! impl StateMachine for ConnectionState {
//!     type Input = ConnectionInput;
//!     type Output = ();
//!
//!     fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, ())> {
//!         match (self, input) {
//!             (Disconnected, Connect) => Ok((Connected, ())),
//!             (Connected, Dropped(_)) => Ok((Disconnected, ())),
//!             (from, input) => Err(TransitionError::InvalidTransition { .. }),
//!         }
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state with the given input is not allowed
    #[error("Invalid transition from {from} on {input}")]
    InvalidTransition { from: String, input: String },
}

/// Trait for finite state machines
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

/// Record of one accepted transition
#[derive(Debug, Clone)]
pub struct Transition<S, I> {
    /// State before transition
    pub from: S,

    /// State after transition
    pub to: S,

    /// Input that triggered transition
    pub input: I,

    pub timestamp: DateTime<Utc>,
}

impl<S, I> Transition<S, I> {
    pub fn new(from: S, to: S, input: I, timestamp: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
        }
    }
}

/// State machine that keeps its transition history
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    current: FSM,
    history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition and record it; a rejected input leaves state and history untouched
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: DateTime<Utc>,
    ) -> TransitionResult<FSM::Output> {
        let (to, output) = self.current.transition(&input)?;
        let from = std::mem::replace(&mut self.current, to.clone());

        self.history.push(Transition::new(from, to, input, timestamp));
        Ok(output)
    }

    pub fn history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    pub fn current_state(&self) -> &FSM {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Door {
        Closed,
        Open,
    }

    #[derive(Debug, Clone)]
    enum DoorInput {
        Push,
        Pull,
    }

    impl StateMachine for Door {
        type Input = DoorInput;
        type Output = ();

        fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
            match (self, input) {
                (Door::Closed, DoorInput::Push) => Ok((Door::Open, ())),
                (Door::Open, DoorInput::Pull) => Ok((Door::Closed, ())),
                (from, input) => Err(TransitionError::InvalidTransition {
                    from: format!("{:?}", from),
                    input: format!("{:?}", input),
                }),
            }
        }
    }

    #[test]
    fn test_can_transition() {
        assert!(Door::Closed.can_transition(&DoorInput::Push));
        assert!(!Door::Closed.can_transition(&DoorInput::Pull));
    }

    #[test]
    fn test_history_records_accepted_transitions_only() {
        let mut door = StateMachineWithHistory::new(Door::Closed);

        door.transition_with_history(DoorInput::Push, Utc::now()).unwrap();
        let rejected = door.transition_with_history(DoorInput::Push, Utc::now());
        door.transition_with_history(DoorInput::Pull, Utc::now()).unwrap();

        assert!(rejected.is_err());
        assert_eq!(*door.current_state(), Door::Closed);
        assert_eq!(door.history().len(), 2);
        assert_eq!(door.history()[0].to, Door::Open);
    }
}
