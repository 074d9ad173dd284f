// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sync Run State Machine
//!
//! One run of one source.
//!
//! # States
//!
//! - Init: configuration being validated
//! - Auth: source session and registry being checked
//! - Phase(i of n): phase `i` running (1-based)
//! - Done: every phase attempted (terminal)
//! - Aborted: setup failed, no phase ran (terminal)
//!
//! # Transitions
//!
//! ```text
//! Init ──Validated──▶ Auth ──Authenticated{n>0}──▶ Phase(1/n) ──PhaseFinished──▶ ... ──▶ Done
//!   │                   ├──Authenticated{0}────────────────────────────────────────────▶ Done
//!   └──SetupFailed──▶ Aborted ◀──SetupFailed──┘
//! ```
//!
//! A failing phase does not abort the run: it finishes like any other
//! phase and the next one starts.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Run lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Init,
    Auth,
    Phase { index: usize, total: usize },
    Done,
    Aborted { reason: String },
}

/// Events driving a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunInput {
    Validated,
    Authenticated { phases: usize },
    PhaseFinished,
    SetupFailed(String),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "INIT"),
            RunState::Auth => write!(f, "AUTH"),
            RunState::Phase { index, total } => write!(f, "PHASE[{}/{}]", index, total),
            RunState::Done => write!(f, "DONE"),
            RunState::Aborted { .. } => write!(f, "ABORTED"),
        }
    }
}

impl fmt::Display for RunInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunInput::Validated => write!(f, "validated"),
            RunInput::Authenticated { phases } => write!(f, "authenticated ({} phases)", phases),
            RunInput::PhaseFinished => write!(f, "phase finished"),
            RunInput::SetupFailed(reason) => write!(f, "setup failed: {}", reason),
        }
    }
}

impl StateMachine for RunState {
    type Input = RunInput;
    type Output = ();

    fn transition(&self, input: &RunInput) -> TransitionResult<(Self, ())> {
        let next = match (self, input) {
            (RunState::Done, _) | (RunState::Aborted { .. }, _) => {
                return Err(TransitionError::Terminal(self.to_string()));
            }
            (RunState::Init, RunInput::Validated) => RunState::Auth,
            (RunState::Auth, RunInput::Authenticated { phases: 0 }) => RunState::Done,
            (RunState::Auth, RunInput::Authenticated { phases }) => RunState::Phase {
                index: 1,
                total: *phases,
            },
            (RunState::Init | RunState::Auth, RunInput::SetupFailed(reason)) => RunState::Aborted {
                reason: reason.clone(),
            },
            (RunState::Phase { index, total }, RunInput::PhaseFinished) if index < total => {
                RunState::Phase {
                    index: index + 1,
                    total: *total,
                }
            }
            (RunState::Phase { .. }, RunInput::PhaseFinished) => RunState::Done,
            (state, input) => {
                return Err(TransitionError::InvalidTransition {
                    from: state.to_string(),
                    input: input.to_string(),
                });
            }
        };
        Ok((next, ()))
    }

    fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(state: RunState, input: RunInput) -> RunState {
        state.transition(&input).unwrap().0
    }

    #[test]
    fn test_happy_path() {
        let mut state = step(RunState::Init, RunInput::Validated);
        state = step(state, RunInput::Authenticated { phases: 2 });
        assert_eq!(state, RunState::Phase { index: 1, total: 2 });
        state = step(state, RunInput::PhaseFinished);
        assert_eq!(state.to_string(), "PHASE[2/2]");
        state = step(state, RunInput::PhaseFinished);
        assert_eq!(state, RunState::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_no_phases_is_done() {
        let state = step(RunState::Auth, RunInput::Authenticated { phases: 0 });
        assert_eq!(state, RunState::Done);
    }

    #[test]
    fn test_abort_only_during_setup() {
        let aborted = step(RunState::Auth, RunInput::SetupFailed("401".into()));
        assert_eq!(aborted, RunState::Aborted { reason: "401".into() });

        let phase = RunState::Phase { index: 1, total: 3 };
        assert!(!phase.can_transition(&RunInput::SetupFailed("late".into())));
        assert!(!RunState::Init.can_transition(&RunInput::PhaseFinished));
    }

    #[test]
    fn test_terminal_states_reject_input() {
        assert!(matches!(
            RunState::Done.transition(&RunInput::Validated),
            Err(TransitionError::Terminal(_))
        ));
    }
}
