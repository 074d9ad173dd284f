// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Lifecycles are modeled as pure transition functions over strongly typed
//! states:
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! A transition has no side effects. The caller performs the work, feeds
//! the outcome in as input, and acts on the state it gets back. Invalid
//! (state, input) pairs are errors rather than silent no-ops.

pub mod sync_run;

pub use sync_run::{RunInput, RunState};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid transition from {from} on {input}")]
    InvalidTransition { from: String, input: String },

    /// The state accepts no further input
    #[error("State {0} is terminal")]
    Terminal(String),
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

    /// Whether no input is accepted any more
    fn is_terminal(&self) -> bool;
}
