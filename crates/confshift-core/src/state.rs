//! Run state machine
//!
//! ```text
//! Idle -> Discover -> ExecuteUnit(0) -> ... -> ExecuteUnit(n) -> Commit -> Done
//!                 \                         \                 \
//!                  +-> Commit (nothing)      +-> Abort -------+-> Abort -> Done
//! ```

use std::fmt::{self, Display, Formatter};

use crate::error::MigrationError;

/// Orchestrator run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Not started
    Idle,
    /// Selecting units
    Discover,
    /// Running the unit at this position
    ExecuteUnit(usize),
    /// Persisting results
    Commit,
    /// Failure handling
    Abort,
    /// Finished
    Done,
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Discover => f.write_str("Discover"),
            Self::ExecuteUnit(i) => write!(f, "ExecuteUnit({i})"),
            Self::Commit => f.write_str("Commit"),
            Self::Abort => f.write_str("Abort"),
            Self::Done => f.write_str("Done"),
        }
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns `IllegalTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), MigrationError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(MigrationError::IllegalTransition { from, to })
    }
}

/// States reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::{Abort, Commit, Discover, Done, ExecuteUnit, Idle};
    match from {
        Idle => vec![Discover],
        Discover => vec![ExecuteUnit(0), Commit, Abort],
        ExecuteUnit(i) => vec![ExecuteUnit(i + 1), Commit, Abort],
        Commit => vec![Done, Abort],
        Abort => vec![Done],
        Done => vec![],
    }
}

/// Current state plus its validated history
#[derive(Debug, Clone)]
pub(crate) struct StateTracker {
    current: RunState,
    trail: Vec<RunState>,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            current: RunState::Idle,
            trail: vec![RunState::Idle],
        }
    }

    pub(crate) fn current(&self) -> RunState {
        self.current
    }

    pub(crate) fn advance(&mut self, to: RunState) -> Result<(), MigrationError> {
        validate_transition(self.current, to)?;
        tracing::debug!(from = %self.current, to = %to, "run state transition");
        self.current = to;
        self.trail.push(to);
        Ok(())
    }

    pub(crate) fn into_trail(self) -> Vec<RunState> {
        self.trail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut tracker = StateTracker::new();
        for state in [
            RunState::Discover,
            RunState::ExecuteUnit(0),
            RunState::ExecuteUnit(1),
            RunState::Commit,
            RunState::Done,
        ] {
            tracker.advance(state).unwrap();
        }
        assert_eq!(tracker.current(), RunState::Done);
        assert_eq!(tracker.into_trail().len(), 6);
    }

    #[test]
    fn skipping_units_is_illegal() {
        assert!(validate_transition(RunState::ExecuteUnit(0), RunState::ExecuteUnit(2)).is_err());
        assert!(validate_transition(RunState::Idle, RunState::Commit).is_err());
        assert!(validate_transition(RunState::Done, RunState::Idle).is_err());
    }

    #[test]
    fn abort_reachable_from_work_states() {
        assert!(validate_transition(RunState::Discover, RunState::Abort).is_ok());
        assert!(validate_transition(RunState::ExecuteUnit(3), RunState::Abort).is_ok());
        assert!(validate_transition(RunState::Commit, RunState::Abort).is_ok());
        assert!(validate_transition(RunState::Abort, RunState::Done).is_ok());
    }

    #[test]
    fn illegal_transition_display() {
        let err = validate_transition(RunState::Idle, RunState::Done).unwrap_err();
        assert_eq!(err.to_string(), "illegal run state transition Idle -> Done");
    }
}
