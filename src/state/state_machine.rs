use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// Lifecycle phases a match goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    /// Match created, players can still take their places.
    NotStarted,
    /// Goals and undos are accepted.
    InProgress,
    /// Play suspended; the ledger is frozen until the match resumes.
    Paused,
    /// A team reached the winning score; an undo may still reopen the match.
    Completed,
    /// Result confirmed; the ledger is sealed.
    Finished,
    /// Match abandoned; the ledger is sealed.
    Cancelled,
}

impl MatchPhase {
    /// Whether the phase is final and the ledger no longer accepts events.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchPhase::Finished | MatchPhase::Cancelled)
    }
}

/// Events that can be applied to the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Referee starts the match.
    Start,
    /// Referee suspends play.
    Pause,
    /// Referee resumes play after a pause.
    Resume,
    /// The ledger reports that a team reached the winning score.
    WinReached,
    /// An undo dropped the leading team back below the winning score.
    Reopened,
    /// Referee confirms the result.
    Finish,
    /// Referee abandons the match.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: MatchPhase,
    /// The event that cannot be applied from this phase.
    pub event: MatchEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: MatchPhase,
        /// Current phase.
        actual: MatchPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: MatchPhase,
    /// Phase the state machine will transition to.
    pub to: MatchPhase,
    /// Event that triggered this transition.
    pub event: MatchEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: MatchPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<MatchPhase>,
}

/// State machine implementing the lifecycle of a single match.
#[derive(Debug, Clone)]
pub struct MatchStateMachine {
    phase: MatchPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for MatchStateMachine {
    fn default() -> Self {
        Self::resume_at(MatchPhase::NotStarted)
    }
}

impl MatchStateMachine {
    /// Create a new state machine for a match that has not started yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a state machine at a phase loaded from storage.
    pub fn resume_at(phase: MatchPhase) -> Self {
        Self {
            phase,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: MatchEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Plan and apply in one step, for transitions driven by the ledger itself.
    pub fn advance(&mut self, event: MatchEvent) -> Result<MatchPhase, PlanError> {
        let plan = self.plan(event)?;
        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;
        Ok(self.phase)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: MatchEvent) -> Result<MatchPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (MatchPhase::NotStarted, MatchEvent::Start) => MatchPhase::InProgress,
            (MatchPhase::InProgress, MatchEvent::Pause) => MatchPhase::Paused,
            (MatchPhase::Paused, MatchEvent::Resume) => MatchPhase::InProgress,
            (MatchPhase::InProgress, MatchEvent::WinReached) => MatchPhase::Completed,
            (MatchPhase::Completed, MatchEvent::Reopened) => MatchPhase::InProgress,
            (
                MatchPhase::InProgress | MatchPhase::Paused | MatchPhase::Completed,
                MatchEvent::Finish,
            ) => MatchPhase::Finished,
            (
                MatchPhase::NotStarted | MatchPhase::InProgress | MatchPhase::Paused,
                MatchEvent::Cancel,
            ) => MatchPhase::Cancelled,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut MatchStateMachine, event: MatchEvent) -> MatchPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_not_started() {
        let sm = MatchStateMachine::new();
        assert_eq!(sm.phase(), MatchPhase::NotStarted);
    }

    #[test]
    fn full_happy_path_through_match() {
        let mut sm = MatchStateMachine::new();

        assert_eq!(apply(&mut sm, MatchEvent::Start), MatchPhase::InProgress);
        assert_eq!(apply(&mut sm, MatchEvent::Pause), MatchPhase::Paused);
        assert_eq!(apply(&mut sm, MatchEvent::Resume), MatchPhase::InProgress);
        assert_eq!(apply(&mut sm, MatchEvent::WinReached), MatchPhase::Completed);
        assert_eq!(apply(&mut sm, MatchEvent::Finish), MatchPhase::Finished);
        assert!(sm.phase().is_terminal());
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn undo_after_win_reopens() {
        let mut sm = MatchStateMachine::new();
        apply(&mut sm, MatchEvent::Start);
        assert_eq!(sm.advance(MatchEvent::WinReached), Ok(MatchPhase::Completed));
        assert_eq!(sm.advance(MatchEvent::Reopened), Ok(MatchPhase::InProgress));
    }

    #[test]
    fn cancel_is_refused_once_completed() {
        let mut sm = MatchStateMachine::new();
        apply(&mut sm, MatchEvent::Start);
        apply(&mut sm, MatchEvent::WinReached);

        let err = sm.plan(MatchEvent::Cancel).unwrap_err();
        match err {
            PlanError::InvalidTransition(InvalidTransition { from, event }) => {
                assert_eq!(from, MatchPhase::Completed);
                assert_eq!(event, MatchEvent::Cancel);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn terminal_phases_accept_nothing() {
        for terminal in [MatchPhase::Finished, MatchPhase::Cancelled] {
            let mut sm = MatchStateMachine::resume_at(terminal);
            for event in [
                MatchEvent::Start,
                MatchEvent::Pause,
                MatchEvent::Resume,
                MatchEvent::WinReached,
                MatchEvent::Reopened,
                MatchEvent::Finish,
                MatchEvent::Cancel,
            ] {
                assert!(sm.plan(event).is_err(), "{event:?} accepted in {terminal:?}");
            }
        }
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = MatchStateMachine::new();
        let err = sm.plan(MatchEvent::Pause).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, MatchPhase::NotStarted);
                assert_eq!(invalid.event, MatchEvent::Pause);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn second_plan_is_rejected_while_pending() {
        let mut sm = MatchStateMachine::new();
        sm.plan(MatchEvent::Start).unwrap();
        assert_eq!(sm.plan(MatchEvent::Cancel).unwrap_err(), PlanError::AlreadyPending);
    }

    #[test]
    fn abort_clears_pending() {
        let mut sm = MatchStateMachine::new();
        let plan = sm.plan(MatchEvent::Start).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), MatchPhase::NotStarted);
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan() {
        let mut sm = MatchStateMachine::new();
        let plan = sm.plan(MatchEvent::Start).unwrap();
        let other = Uuid::new_v4();
        assert_eq!(
            sm.apply(other),
            Err(ApplyError::IdMismatch {
                expected: plan.id,
                got: other
            })
        );
        assert_eq!(sm.apply(plan.id), Ok(MatchPhase::InProgress));
    }
}
