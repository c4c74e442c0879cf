//! Orchestration call state machine — explicit states and legal transition guards.
//!
//! Every call to [`crate::Orchestrator::run_parallel_comparison`] drives one
//! [`CallStateMachine`] from `Received` to exactly one of the terminal states
//! `Completed` or `Failed`. Each transition is validated against the table in
//! [`is_legal_transition`] and recorded for diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// The states of a single orchestration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Task accepted, nothing dispatched yet.
    Received,
    /// Selecting eligible providers and spawning their calls.
    Dispatching,
    /// Waiting for provider calls under the request deadline.
    Collecting,
    /// Computing confidence scores.
    Scoring,
    /// A winner has been chosen.
    Selected,
    /// The episode has been appended to the context store.
    Recorded,
    /// Terminal success.
    Completed,
    /// Terminal failure (no eligible or no successful provider).
    Failed,
}

impl CallState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "Received"),
            Self::Dispatching => write!(f, "Dispatching"),
            Self::Collecting => write!(f, "Collecting"),
            Self::Scoring => write!(f, "Scoring"),
            Self::Selected => write!(f, "Selected"),
            Self::Recorded => write!(f, "Recorded"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions between call states.
///
/// ```text
/// Received → Dispatching
/// Dispatching → Collecting | Failed
/// Collecting → Scoring | Failed
/// Scoring → Selected
/// Selected → Recorded
/// Recorded → Completed
/// ```
fn is_legal_transition(from: CallState, to: CallState) -> bool {
    use CallState::*;

    matches!(
        (from, to),
        (Received, Dispatching)
            | (Dispatching, Collecting)
            | (Dispatching, Failed)
            | (Collecting, Scoring)
            | (Collecting, Failed)
            | (Scoring, Selected)
            | (Selected, Recorded)
            | (Recorded, Completed)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: CallState,
    pub to: CallState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: CallState,
    pub to: CallState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks one call's current state and its full transition log.
pub struct CallStateMachine {
    task_id: String,
    current: CallState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl CallStateMachine {
    /// Create a new state machine starting at `Received`.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            current: CallState::Received,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> CallState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(&mut self, to: CallState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            task_id = %self.task_id,
            from = %self.current,
            to = %to,
            "Call state transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed`; only legal while dispatching or collecting.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(CallState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Consume the machine, returning its transition log.
    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_at(state: CallState) -> CallStateMachine {
        CallStateMachine {
            task_id: "t".to_string(),
            current: state,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    #[test]
    fn test_initial_state() {
        let sm = CallStateMachine::new("task-1");
        assert_eq!(sm.current(), CallState::Received);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut sm = CallStateMachine::new("task-1");
        for state in [
            CallState::Dispatching,
            CallState::Collecting,
            CallState::Scoring,
            CallState::Selected,
            CallState::Recorded,
            CallState::Completed,
        ] {
            sm.advance(state, None).unwrap();
        }
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 6);
        assert_eq!(sm.transitions()[0].from, CallState::Received);
    }

    #[test]
    fn test_failure_only_from_dispatching_or_collecting() {
        for state in [CallState::Dispatching, CallState::Collecting] {
            let mut sm = machine_at(state);
            assert!(sm.fail("all providers failed").is_ok());
            assert_eq!(sm.current(), CallState::Failed);
        }
        for state in [
            CallState::Received,
            CallState::Scoring,
            CallState::Selected,
            CallState::Recorded,
            CallState::Completed,
        ] {
            let mut sm = machine_at(state);
            assert!(sm.fail("nope").is_err());
        }
    }

    #[test]
    fn test_cannot_leave_terminal_state() {
        let mut sm = machine_at(CallState::Failed);
        let err = sm.advance(CallState::Dispatching, None).unwrap_err();
        assert_eq!(err.from, CallState::Failed);
        assert_eq!(err.to, CallState::Dispatching);
    }

    #[test]
    fn test_illegal_skip_transition() {
        let mut sm = CallStateMachine::new("task-1");
        let err = sm.advance(CallState::Scoring, None).unwrap_err();
        assert_eq!(err.to_string(), "Illegal state transition: Received → Scoring");
        assert_eq!(sm.current(), CallState::Received);
    }

    #[test]
    fn test_reason_is_recorded() {
        let mut sm = CallStateMachine::new("task-1");
        sm.advance(CallState::Dispatching, Some("3 eligible")).unwrap();
        assert_eq!(sm.transitions()[0].reason.as_deref(), Some("3 eligible"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_follows_tokio_clock() {
        let mut sm = CallStateMachine::new("task-1");
        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        sm.advance(CallState::Dispatching, None).unwrap();
        assert_eq!(sm.transitions()[0].elapsed_ms, 250);
    }
}
