use std::time::{Instant, SystemTime};

use uuid::Uuid;

use crate::{
    dao::models::{
        EventKindEntity, MatchEntity, MatchModeEntity, MatchPhaseEntity, MatchRulesEntity,
        ScoreEventEntity, SideEntity, TeamLineupEntity,
    },
    state::{
        ledger::{
            EventKind, IngestOutcome, LedgerError, MatchRules, MatchState, ScoreEvent,
            ScoreLedger, Side,
        },
        state_machine::{
            AbortError, ApplyError, MatchEvent, MatchPhase, MatchStateMachine, Plan, PlanError,
            PlanId,
        },
    },
};

/// Team format of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// One player per side.
    OneVsOne,
    /// Two players per side.
    TwoVsTwo,
}

impl MatchMode {
    /// Number of players each side must field.
    pub fn players_per_team(self) -> usize {
        match self {
            MatchMode::OneVsOne => 1,
            MatchMode::TwoVsTwo => 2,
        }
    }
}

/// Team name and players on one side of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamLineup {
    /// Display name.
    pub name: String,
    /// Player names.
    pub players: Vec<String>,
}

/// Which scoring controls the referee may use right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    /// A goal for side A would be accepted.
    pub can_score_a: bool,
    /// A goal for side B would be accepted.
    pub can_score_b: bool,
    /// An undo would be accepted.
    pub can_undo: bool,
}

/// Effect of a scoring operation on a session.
#[derive(Debug, Clone)]
pub struct ScoreUpdate {
    /// Events appended to the ledger by the operation.
    pub appended: Vec<ScoreEvent>,
    /// Recomputed state after the operation.
    pub state: MatchState,
    /// New lifecycle phase when the operation completed or reopened the match.
    pub phase_change: Option<MatchPhase>,
    /// Buffered events dropped while draining the reorder buffer.
    pub rejected: Vec<LedgerError>,
}

/// Result of feeding a remote event to a session.
#[derive(Debug, Clone)]
pub enum SessionIngest {
    /// The event was appended, possibly along with buffered successors.
    Applied(ScoreUpdate),
    /// The event waits for a missing predecessor.
    Buffered {
        /// Sequence still missing.
        expected: u64,
    },
}

/// Live match: metadata, lifecycle and score ledger.
#[derive(Debug, Clone)]
pub struct MatchSession {
    /// Primary key of the match.
    pub id: Uuid,
    /// 1v1 or 2v2.
    pub mode: MatchMode,
    /// Team on side A.
    pub team_a: TeamLineup,
    /// Team on side B.
    pub team_b: TeamLineup,
    /// Optional location label.
    pub venue: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// First time the match entered play.
    pub started_at: Option<SystemTime>,
    /// Time the match reached a terminal phase.
    pub ended_at: Option<SystemTime>,
    lifecycle: MatchStateMachine,
    ledger: ScoreLedger,
}

impl MatchSession {
    /// Build a new session that has not started yet.
    pub fn new(
        mode: MatchMode,
        team_a: TeamLineup,
        team_b: TeamLineup,
        venue: Option<String>,
        rules: MatchRules,
        pending_capacity: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            team_a,
            team_b,
            venue,
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
            lifecycle: MatchStateMachine::new(),
            ledger: ScoreLedger::new(rules).with_pending_capacity(pending_capacity),
        }
    }

    /// Rehydrate a session from its stored header and event log.
    pub fn from_storage(
        entity: MatchEntity,
        events: Vec<ScoreEventEntity>,
        pending_capacity: usize,
    ) -> Result<Self, LedgerError> {
        let rules = MatchRules::from(entity.rules);
        let events = events.into_iter().map(ScoreEvent::from).collect();
        let mut ledger =
            ScoreLedger::from_events(rules, events)?.with_pending_capacity(pending_capacity);

        let phase = MatchPhase::from(entity.phase);
        if phase.is_terminal() {
            ledger.seal();
        }

        Ok(Self {
            id: entity.id,
            mode: entity.mode.into(),
            team_a: entity.team_a.into(),
            team_b: entity.team_b.into(),
            venue: entity.venue,
            created_at: entity.created_at,
            started_at: entity.started_at,
            ended_at: entity.ended_at,
            lifecycle: MatchStateMachine::resume_at(phase),
            ledger,
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MatchPhase {
        self.lifecycle.phase()
    }

    /// Score and winner derived from the ledger.
    pub fn state(&self) -> MatchState {
        self.ledger.current_state()
    }

    /// Read access to the ledger.
    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    /// Lineup playing on `side`.
    pub fn team(&self, side: Side) -> &TeamLineup {
        match side {
            Side::A => &self.team_a,
            Side::B => &self.team_b,
        }
    }

    /// Scoring controls currently available.
    pub fn controls(&self) -> Controls {
        let open = self.ensure_accepting().is_ok();
        Controls {
            can_score_a: open && self.ledger.is_legal_next_event(EventKind::Goal, Side::A),
            can_score_b: open && self.ledger.is_legal_next_event(EventKind::Goal, Side::B),
            can_undo: open && self.ledger.is_legal_next_event(EventKind::Undo, Side::A),
        }
    }

    /// Record a goal for `team`.
    pub fn record_goal(&mut self, team: Side) -> Result<ScoreUpdate, LedgerError> {
        self.ensure_accepting()?;
        let before = self.ledger.events().len();
        let state = self.ledger.record_goal(team)?;
        Ok(self.after_append(before, state, Vec::new()))
    }

    /// Cancel the latest active goal.
    pub fn undo_last_goal(&mut self) -> Result<ScoreUpdate, LedgerError> {
        self.ensure_accepting()?;
        let before = self.ledger.events().len();
        let state = self.ledger.undo_last_goal()?;
        Ok(self.after_append(before, state, Vec::new()))
    }

    /// Feed an event committed by another contributor.
    ///
    /// Such events are already committed, so they are taken while the match is
    /// paused as well.
    pub fn ingest(&mut self, event: ScoreEvent, now: Instant) -> Result<SessionIngest, LedgerError> {
        if self.phase() != MatchPhase::Paused {
            self.ensure_accepting()?;
        }
        let before = self.ledger.events().len();
        match self.ledger.ingest(event, now)? {
            IngestOutcome::Buffered { expected } => Ok(SessionIngest::Buffered { expected }),
            IngestOutcome::Applied { rejected, .. } => {
                let state = self.ledger.current_state();
                Ok(SessionIngest::Applied(self.after_append(before, state, rejected)))
            }
        }
    }

    /// Swap the ledger for one rebuilt from the event store.
    ///
    /// Returns the phase change implied by the new score, if any.
    pub fn replace_ledger(&mut self, mut ledger: ScoreLedger) -> Option<MatchPhase> {
        if self.phase().is_terminal() {
            ledger.seal();
        }
        self.ledger = ledger;
        let state = self.ledger.current_state();
        self.sync_phase(&state)
    }

    /// Drain the reorder buffer before the ledger is rebuilt.
    pub fn take_pending(&mut self) -> Vec<ScoreEvent> {
        self.ledger.take_pending()
    }

    /// Validate a referee-driven lifecycle event and keep it pending.
    pub fn plan_lifecycle(&mut self, event: MatchEvent) -> Result<Plan, PlanError> {
        self.lifecycle.plan(event)
    }

    /// Commit a pending lifecycle plan. Terminal phases seal the ledger.
    ///
    /// Resuming a match that was won while paused lands in `Completed`.
    pub fn apply_lifecycle(&mut self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let phase = self.lifecycle.apply(plan_id)?;
        self.stamp(phase, SystemTime::now());
        if phase.is_terminal() {
            self.ledger.seal();
            return Ok(phase);
        }
        let state = self.ledger.current_state();
        Ok(self.sync_phase(&state).unwrap_or(phase))
    }

    /// Drop a pending lifecycle plan.
    pub fn abort_lifecycle(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        self.lifecycle.abort(plan_id)
    }

    /// Header as it will look once `plan` is applied.
    pub fn preview_entity(&self, plan: &Plan) -> MatchEntity {
        let mut preview = self.clone();
        preview.stamp(plan.to, SystemTime::now());
        let mut entity = preview.to_entity();
        entity.phase = match plan.to {
            MatchPhase::InProgress if self.state().is_complete => MatchPhase::Completed,
            to => to,
        }
        .into();
        entity
    }

    /// Header reflecting the current session.
    pub fn to_entity(&self) -> MatchEntity {
        let state = self.state();
        MatchEntity {
            id: self.id,
            mode: self.mode.into(),
            team_a: self.team_a.clone().into(),
            team_b: self.team_b.clone().into(),
            venue: self.venue.clone(),
            rules: self.ledger.rules().into(),
            phase: self.phase().into(),
            score_a: state.score_a,
            score_b: state.score_b,
            winner: state.winner.map(Into::into),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            updated_at: SystemTime::now(),
        }
    }

    fn stamp(&mut self, phase: MatchPhase, now: SystemTime) {
        if phase == MatchPhase::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if phase.is_terminal() {
            self.ended_at = Some(now);
        }
    }

    fn ensure_accepting(&self) -> Result<(), LedgerError> {
        match self.phase() {
            MatchPhase::InProgress | MatchPhase::Completed => Ok(()),
            MatchPhase::Finished | MatchPhase::Cancelled => Err(LedgerError::Sealed),
            MatchPhase::NotStarted => {
                Err(LedgerError::IllegalState("match has not started".into()))
            }
            MatchPhase::Paused => Err(LedgerError::IllegalState("match is paused".into())),
        }
    }

    fn after_append(
        &mut self,
        before: usize,
        state: MatchState,
        rejected: Vec<LedgerError>,
    ) -> ScoreUpdate {
        let appended = self.ledger.events()[before..].to_vec();
        let phase_change = self.sync_phase(&state);
        ScoreUpdate {
            appended,
            state,
            phase_change,
            rejected,
        }
    }

    /// Follow the ledger: entering or leaving the completed phase is automatic.
    fn sync_phase(&mut self, state: &MatchState) -> Option<MatchPhase> {
        let event = match (self.phase(), state.is_complete) {
            (MatchPhase::InProgress, true) => MatchEvent::WinReached,
            (MatchPhase::Completed, false) => MatchEvent::Reopened,
            _ => return None,
        };
        self.lifecycle.advance(event).ok()
    }
}

impl From<MatchPhase> for MatchPhaseEntity {
    fn from(value: MatchPhase) -> Self {
        match value {
            MatchPhase::NotStarted => MatchPhaseEntity::NotStarted,
            MatchPhase::InProgress => MatchPhaseEntity::InProgress,
            MatchPhase::Paused => MatchPhaseEntity::Paused,
            MatchPhase::Completed => MatchPhaseEntity::Completed,
            MatchPhase::Finished => MatchPhaseEntity::Finished,
            MatchPhase::Cancelled => MatchPhaseEntity::Cancelled,
        }
    }
}

impl From<MatchPhaseEntity> for MatchPhase {
    fn from(value: MatchPhaseEntity) -> Self {
        match value {
            MatchPhaseEntity::NotStarted => MatchPhase::NotStarted,
            MatchPhaseEntity::InProgress => MatchPhase::InProgress,
            MatchPhaseEntity::Paused => MatchPhase::Paused,
            MatchPhaseEntity::Completed => MatchPhase::Completed,
            MatchPhaseEntity::Finished => MatchPhase::Finished,
            MatchPhaseEntity::Cancelled => MatchPhase::Cancelled,
        }
    }
}

impl From<Side> for SideEntity {
    fn from(value: Side) -> Self {
        match value {
            Side::A => SideEntity::A,
            Side::B => SideEntity::B,
        }
    }
}

impl From<SideEntity> for Side {
    fn from(value: SideEntity) -> Self {
        match value {
            SideEntity::A => Side::A,
            SideEntity::B => Side::B,
        }
    }
}

impl From<MatchMode> for MatchModeEntity {
    fn from(value: MatchMode) -> Self {
        match value {
            MatchMode::OneVsOne => MatchModeEntity::OneVsOne,
            MatchMode::TwoVsTwo => MatchModeEntity::TwoVsTwo,
        }
    }
}

impl From<MatchModeEntity> for MatchMode {
    fn from(value: MatchModeEntity) -> Self {
        match value {
            MatchModeEntity::OneVsOne => MatchMode::OneVsOne,
            MatchModeEntity::TwoVsTwo => MatchMode::TwoVsTwo,
        }
    }
}

impl From<TeamLineup> for TeamLineupEntity {
    fn from(value: TeamLineup) -> Self {
        Self {
            name: value.name,
            players: value.players,
        }
    }
}

impl From<TeamLineupEntity> for TeamLineup {
    fn from(value: TeamLineupEntity) -> Self {
        Self {
            name: value.name,
            players: value.players,
        }
    }
}

impl From<MatchRules> for MatchRulesEntity {
    fn from(value: MatchRules) -> Self {
        Self {
            winning_score: value.winning_score,
            allow_undo_after_win: value.allow_undo_after_win,
        }
    }
}

impl From<MatchRulesEntity> for MatchRules {
    fn from(value: MatchRulesEntity) -> Self {
        Self {
            winning_score: value.winning_score,
            allow_undo_after_win: value.allow_undo_after_win,
        }
    }
}

impl From<ScoreEventEntity> for ScoreEvent {
    fn from(value: ScoreEventEntity) -> Self {
        Self {
            id: value.id,
            team: value.team.into(),
            kind: match value.kind {
                EventKindEntity::Goal => EventKind::Goal,
                EventKindEntity::Undo => EventKind::Undo,
            },
            target: value.target,
            sequence: value.sequence,
            occurred_at: value.occurred_at,
        }
    }
}

/// Attach the owning match to a ledger event for persistence.
pub fn event_entity(match_id: Uuid, event: &ScoreEvent) -> ScoreEventEntity {
    ScoreEventEntity {
        id: event.id,
        match_id,
        team: event.team.into(),
        kind: match event.kind {
            EventKind::Goal => EventKindEntity::Goal,
            EventKind::Undo => EventKindEntity::Undo,
        },
        target: event.target,
        sequence: event.sequence,
        occurred_at: event.occurred_at,
    }
}
