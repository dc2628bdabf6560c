//! Append-only score ledger owning the scoring history of a single match.
//!
//! Every goal and every undo goes through [`ScoreLedger`]. The derived
//! [`MatchState`] is never stored on its own: it is recomputed from the
//! event sequence so the scoreboard, the persistence queue and the realtime
//! fan-out always agree on the same numbers.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    time::{Duration, Instant, SystemTime},
};

use thiserror::Error;
use uuid::Uuid;

/// Identifier carried by every ledger event.
pub type EventId = Uuid;

/// Default number of out-of-order events kept while waiting for a missing predecessor.
pub const DEFAULT_PENDING_CAPACITY: usize = 64;

/// One of the two sides of a foosball table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Team listed first when the match was created.
    A,
    /// Team listed second when the match was created.
    B,
}

impl Side {
    /// Both sides, in display order.
    pub const ALL: [Side; 2] = [Side::A, Side::B];

    /// The side facing this one.
    pub fn opponent(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// Kind of a scoring event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A goal scored by the event team.
    Goal,
    /// Cancels the goal referenced by the event target.
    Undo,
}

/// Immutable entry of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEvent {
    /// Unique identifier of the event.
    pub id: EventId,
    /// Team credited by the goal, or team of the cancelled goal for an undo.
    pub team: Side,
    /// Goal or undo.
    pub kind: EventKind,
    /// Goal cancelled by an undo; always `None` for goals.
    pub target: Option<EventId>,
    /// 1-based position in the ledger. Ordering never relies on wall-clock time.
    pub sequence: u64,
    /// Wall-clock time at which the event was recorded.
    pub occurred_at: SystemTime,
}

impl ScoreEvent {
    /// Build a goal event for `team` at the given position.
    pub fn goal(team: Side, sequence: u64, occurred_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            team,
            kind: EventKind::Goal,
            target: None,
            sequence,
            occurred_at,
        }
    }

    /// Build an undo event cancelling `goal` at the given position.
    pub fn undo(goal: &ScoreEvent, sequence: u64, occurred_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            team: goal.team,
            kind: EventKind::Undo,
            target: Some(goal.id),
            sequence,
            occurred_at,
        }
    }
}

/// Scoring rules fixed when the match is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
    /// Number of goals a team needs to win.
    pub winning_score: u32,
    /// Whether undoing the winning goal may reopen a completed match.
    pub allow_undo_after_win: bool,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            winning_score: 7,
            allow_undo_after_win: true,
        }
    }
}

/// Score and win status derived from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchState {
    /// Active goals of team A.
    pub score_a: u32,
    /// Active goals of team B.
    pub score_b: u32,
    /// True once a team reached the winning score.
    pub is_complete: bool,
    /// Team that reached the winning score first, if any.
    pub winner: Option<Side>,
}

impl MatchState {
    /// Active goal count for `side`.
    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::A => self.score_a,
            Side::B => self.score_b,
        }
    }
}

/// Reasons an event may be refused by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The operation is not allowed in the current match state.
    #[error("illegal operation: {0}")]
    IllegalState(String),
    /// Undo requested while no active goal exists.
    #[error("no goal left to undo")]
    EmptyLedger,
    /// The match was closed by an external authority.
    #[error("ledger is sealed")]
    Sealed,
    /// The event id is already part of the ledger or of the reorder buffer.
    #[error("event `{0}` was already received")]
    DuplicateEvent(EventId),
    /// The event sequence does not follow the ledger head.
    #[error("out of order event: expected sequence {expected}, received {received}")]
    OutOfOrderEvent {
        /// Next sequence the ledger can accept.
        expected: u64,
        /// Sequence carried by the offending event.
        received: u64,
    },
    /// Too many events are waiting for a missing predecessor.
    #[error("reorder buffer is full ({capacity} pending events)")]
    BufferFull {
        /// Configured buffer capacity.
        capacity: usize,
    },
    /// The event is malformed or inconsistent with the ledger history.
    #[error("invalid event `{id}`: {reason}")]
    InvalidEvent {
        /// Identifier of the rejected event.
        id: EventId,
        /// Human readable explanation.
        reason: String,
    },
}

/// Result of feeding an externally committed event into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event (and possibly buffered successors) was appended.
    Applied {
        /// Number of events appended by this call.
        applied: usize,
        /// Buffered successors dropped because they were not legal once their turn came.
        rejected: Vec<LedgerError>,
    },
    /// The event was kept aside until the missing predecessor arrives.
    Buffered {
        /// Sequence the ledger is still waiting for.
        expected: u64,
    },
}

#[derive(Debug, Clone)]
struct PendingEvent {
    event: ScoreEvent,
    received_at: Instant,
}

/// Authoritative event sequence of one match.
#[derive(Debug, Clone)]
pub struct ScoreLedger {
    rules: MatchRules,
    events: Vec<ScoreEvent>,
    seen: HashSet<EventId>,
    pending: BTreeMap<u64, PendingEvent>,
    pending_capacity: usize,
    sealed: bool,
}

impl ScoreLedger {
    /// Create an empty ledger for a match played with `rules`.
    pub fn new(rules: MatchRules) -> Self {
        Self {
            rules,
            events: Vec::new(),
            seen: HashSet::new(),
            pending: BTreeMap::new(),
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            sealed: false,
        }
    }

    /// Override the reorder buffer capacity.
    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }

    /// Rebuild a ledger from a persisted history.
    ///
    /// Events are sorted by sequence and must form a contiguous run starting
    /// at 1; every event is re-validated as if it had just been received.
    pub fn from_events(
        rules: MatchRules,
        mut events: Vec<ScoreEvent>,
    ) -> Result<Self, LedgerError> {
        events.sort_by_key(|event| event.sequence);

        let mut ledger = Self::new(rules);
        for event in events {
            let expected = ledger.next_sequence();
            if event.sequence != expected {
                return Err(LedgerError::OutOfOrderEvent {
                    expected,
                    received: event.sequence,
                });
            }
            if ledger.seen.contains(&event.id) {
                return Err(LedgerError::DuplicateEvent(event.id));
            }
            ledger.append_checked(event)?;
        }

        Ok(ledger)
    }

    /// Rules the ledger enforces.
    pub fn rules(&self) -> MatchRules {
        self.rules
    }

    /// Committed events in sequence order.
    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    /// Most recently appended event.
    pub fn last_event(&self) -> Option<&ScoreEvent> {
        self.events.last()
    }

    /// Sequence the next appended event will carry.
    pub fn next_sequence(&self) -> u64 {
        self.events.last().map_or(1, |event| event.sequence + 1)
    }

    /// Number of events waiting for a missing predecessor.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the ledger stopped accepting events.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Stop accepting events for good.
    pub fn seal(&mut self) {
        self.sealed = true;
        self.pending.clear();
    }

    /// Derive score and win status by walking the whole sequence.
    pub fn current_state(&self) -> MatchState {
        derive_state(&self.rules, &self.events)
    }

    /// Append a goal for `team` and return the recomputed state.
    pub fn record_goal(&mut self, team: Side) -> Result<MatchState, LedgerError> {
        self.check_goal(team)?;
        let event = ScoreEvent::goal(team, self.next_sequence(), SystemTime::now());
        self.push(event);
        Ok(self.current_state())
    }

    /// Cancel the most recent active goal and return the recomputed state.
    pub fn undo_last_goal(&mut self) -> Result<MatchState, LedgerError> {
        let goal = self.check_undo()?.clone();
        let event = ScoreEvent::undo(&goal, self.next_sequence(), SystemTime::now());
        self.push(event);
        Ok(self.current_state())
    }

    /// Whether an operation of `kind` for `team` would currently be accepted.
    ///
    /// An undo always targets the latest active goal, so `team` is only
    /// relevant for goals.
    pub fn is_legal_next_event(&self, kind: EventKind, team: Side) -> bool {
        match kind {
            EventKind::Goal => self.check_goal(team).is_ok(),
            EventKind::Undo => self.check_undo().is_ok(),
        }
    }

    /// Feed an event committed by another contributor.
    ///
    /// Events are only appended in contiguous sequence order. A gap keeps the
    /// event aside until its predecessor shows up; see [`Self::overdue_gap`].
    pub fn ingest(&mut self, event: ScoreEvent, now: Instant) -> Result<IngestOutcome, LedgerError> {
        if self.sealed {
            return Err(LedgerError::Sealed);
        }

        if self.seen.contains(&event.id)
            || self.pending.values().any(|pending| pending.event.id == event.id)
        {
            return Err(LedgerError::DuplicateEvent(event.id));
        }

        let expected = self.next_sequence();
        if event.sequence < expected {
            return Err(LedgerError::OutOfOrderEvent {
                expected,
                received: event.sequence,
            });
        }

        if event.sequence > expected {
            if self.pending.contains_key(&event.sequence) {
                return Err(LedgerError::InvalidEvent {
                    id: event.id,
                    reason: format!("sequence {} is already buffered", event.sequence),
                });
            }
            if self.pending.len() >= self.pending_capacity {
                return Err(LedgerError::BufferFull {
                    capacity: self.pending_capacity,
                });
            }
            self.pending.insert(
                event.sequence,
                PendingEvent {
                    event,
                    received_at: now,
                },
            );
            return Ok(IngestOutcome::Buffered { expected });
        }

        self.append_checked(event)?;

        let mut applied = 1;
        let mut rejected = Vec::new();
        loop {
            let next = self.next_sequence();
            let Some(entry) = self.pending.first_entry() else {
                break;
            };
            if *entry.key() != next {
                break;
            }
            let PendingEvent { event, .. } = entry.remove();
            match self.append_checked(event) {
                Ok(()) => applied += 1,
                Err(err) => {
                    rejected.push(err);
                    break;
                }
            }
        }

        Ok(IngestOutcome::Applied { applied, rejected })
    }

    /// When the oldest event still waiting in the reorder buffer arrived.
    pub fn gap_opened_at(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.received_at).min()
    }

    /// Report a gap that has been waiting for longer than `max_wait`.
    pub fn overdue_gap(&self, now: Instant, max_wait: Duration) -> Result<(), LedgerError> {
        let (Some(opened), Some(&sequence)) = (self.gap_opened_at(), self.pending.keys().next())
        else {
            return Ok(());
        };

        if now.saturating_duration_since(opened) > max_wait {
            return Err(LedgerError::OutOfOrderEvent {
                expected: self.next_sequence(),
                received: sequence,
            });
        }

        Ok(())
    }

    /// Drain the reorder buffer, returning the buffered events in sequence order.
    pub fn take_pending(&mut self) -> Vec<ScoreEvent> {
        std::mem::take(&mut self.pending)
            .into_values()
            .map(|pending| pending.event)
            .collect()
    }

    fn check_goal(&self, _team: Side) -> Result<(), LedgerError> {
        self.check_open()?;
        if self.current_state().is_complete {
            return Err(LedgerError::IllegalState("match is already complete".into()));
        }
        Ok(())
    }

    fn check_undo(&self) -> Result<&ScoreEvent, LedgerError> {
        self.check_open()?;
        let goal = self.last_active_goal().ok_or(LedgerError::EmptyLedger)?;
        if self.current_state().is_complete && !self.rules.allow_undo_after_win {
            return Err(LedgerError::IllegalState(
                "rules forbid undoing a goal once the match is complete".into(),
            ));
        }
        Ok(goal)
    }

    fn check_open(&self) -> Result<(), LedgerError> {
        if self.sealed {
            return Err(LedgerError::Sealed);
        }
        if !self.pending.is_empty() {
            return Err(LedgerError::IllegalState(format!(
                "waiting for missing event {} before accepting new ones",
                self.next_sequence()
            )));
        }
        Ok(())
    }

    fn last_active_goal(&self) -> Option<&ScoreEvent> {
        let undone = self.undone_goals();
        self.events
            .iter()
            .rev()
            .find(|event| event.kind == EventKind::Goal && !undone.contains(&event.id))
    }

    fn undone_goals(&self) -> HashSet<EventId> {
        self.events
            .iter()
            .filter(|event| event.kind == EventKind::Undo)
            .filter_map(|event| event.target)
            .collect()
    }

    /// Validate an event received from outside and append it.
    fn append_checked(&mut self, event: ScoreEvent) -> Result<(), LedgerError> {
        match event.kind {
            EventKind::Goal => {
                if event.target.is_some() {
                    return Err(LedgerError::InvalidEvent {
                        id: event.id,
                        reason: "a goal cannot reference a target".into(),
                    });
                }
                if self.current_state().is_complete {
                    return Err(LedgerError::IllegalState("match is already complete".into()));
                }
            }
            EventKind::Undo => {
                let Some(target) = event.target else {
                    return Err(LedgerError::InvalidEvent {
                        id: event.id,
                        reason: "an undo must reference the goal it cancels".into(),
                    });
                };
                let undone = self.undone_goals();
                let goal = self
                    .events
                    .iter()
                    .find(|candidate| candidate.id == target && candidate.kind == EventKind::Goal)
                    .filter(|goal| !undone.contains(&goal.id))
                    .ok_or_else(|| LedgerError::InvalidEvent {
                        id: event.id,
                        reason: format!("target `{target}` is not an active goal"),
                    })?;
                if goal.team != event.team {
                    return Err(LedgerError::InvalidEvent {
                        id: event.id,
                        reason: format!("undo team does not match the team of goal `{target}`"),
                    });
                }
                if self.current_state().is_complete && !self.rules.allow_undo_after_win {
                    return Err(LedgerError::IllegalState(
                        "rules forbid undoing a goal once the match is complete".into(),
                    ));
                }
            }
        }

        self.push(event);
        Ok(())
    }

    fn push(&mut self, event: ScoreEvent) {
        self.seen.insert(event.id);
        self.events.push(event);
    }
}

/// Walk `events` and compute the per-team active goal counts and the winner.
///
/// A team claims the win at the sequence where its active count reaches the
/// winning score and loses the claim if an undo drops it back below.
fn derive_state(rules: &MatchRules, events: &[ScoreEvent]) -> MatchState {
    let mut counts = [0u32; 2];
    let mut reached_at: [Option<u64>; 2] = [None, None];
    let mut active_goals: HashMap<EventId, Side> = HashMap::new();

    for event in events {
        match event.kind {
            EventKind::Goal => {
                active_goals.insert(event.id, event.team);
                let index = event.team.index();
                counts[index] += 1;
                if counts[index] >= rules.winning_score && reached_at[index].is_none() {
                    reached_at[index] = Some(event.sequence);
                }
            }
            EventKind::Undo => {
                let Some(side) = event.target.and_then(|target| active_goals.remove(&target))
                else {
                    continue;
                };
                let index = side.index();
                counts[index] = counts[index].saturating_sub(1);
                if counts[index] < rules.winning_score {
                    reached_at[index] = None;
                }
            }
        }
    }

    let winner = match (reached_at[0], reached_at[1]) {
        (Some(a), Some(b)) if b < a => Some(Side::B),
        (Some(_), _) => Some(Side::A),
        (None, Some(_)) => Some(Side::B),
        (None, None) => None,
    };

    MatchState {
        score_a: counts[0],
        score_b: counts[1],
        is_complete: winner.is_some(),
        winner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(winning_score: u32, allow_undo_after_win: bool) -> MatchRules {
        MatchRules {
            winning_score,
            allow_undo_after_win,
        }
    }

    fn score(ledger: &mut ScoreLedger, goals: &[Side]) {
        for side in goals {
            ledger.record_goal(*side).unwrap();
        }
    }

    fn remote_goal(team: Side, sequence: u64) -> ScoreEvent {
        ScoreEvent::goal(team, sequence, SystemTime::now())
    }

    #[test]
    fn empty_ledger_has_no_score() {
        let ledger = ScoreLedger::new(MatchRules::default());
        assert_eq!(ledger.current_state(), MatchState::default());
        assert_eq!(ledger.next_sequence(), 1);
    }

    #[test]
    fn five_goals_win_and_further_goal_is_rejected() {
        let mut ledger = ScoreLedger::new(rules(5, true));
        score(&mut ledger, &[Side::A; 5]);
        let state = ledger.record_goal(Side::B);
        assert!(matches!(state, Err(LedgerError::IllegalState(_))));

        let mut ledger = ScoreLedger::new(rules(5, true));
        score(&mut ledger, &[Side::A, Side::A, Side::A, Side::A, Side::B]);
        let state = ledger.record_goal(Side::A).unwrap();
        assert_eq!(
            state,
            MatchState {
                score_a: 5,
                score_b: 1,
                is_complete: true,
                winner: Some(Side::A),
            }
        );

        let before = ledger.events().len();
        let err = ledger.record_goal(Side::B).unwrap_err();
        assert!(matches!(err, LedgerError::IllegalState(_)));
        assert_eq!(ledger.events().len(), before);
        assert_eq!(ledger.current_state(), state);
    }

    #[test]
    fn threshold_crossing_completes_in_same_call() {
        let mut ledger = ScoreLedger::new(rules(3, true));
        assert!(!ledger.record_goal(Side::B).unwrap().is_complete);
        assert!(!ledger.record_goal(Side::B).unwrap().is_complete);
        let state = ledger.record_goal(Side::B).unwrap();
        assert!(state.is_complete);
        assert_eq!(state.winner, Some(Side::B));
    }

    #[test]
    fn undo_of_winning_goal_reopens_match() {
        let mut ledger = ScoreLedger::new(rules(7, true));
        score(&mut ledger, &[Side::A, Side::B, Side::A, Side::B, Side::A]);
        score(&mut ledger, &[Side::B, Side::A, Side::B, Side::A, Side::B]);
        let state = ledger.record_goal(Side::A).unwrap();
        assert_eq!((state.score_a, state.score_b), (6, 5));
        assert!(!state.is_complete);
        let state = ledger.record_goal(Side::A).unwrap();
        assert_eq!((state.score_a, state.score_b), (7, 5));
        assert_eq!(state.winner, Some(Side::A));

        let state = ledger.undo_last_goal().unwrap();
        assert_eq!(state.score_a, 6);
        assert_eq!(state.score_b, 5);
        assert!(!state.is_complete);
        assert_eq!(state.winner, None);

        assert!(ledger.is_legal_next_event(EventKind::Goal, Side::B));
    }

    #[test]
    fn undo_after_win_is_refused_when_rules_forbid_it() {
        let mut ledger = ScoreLedger::new(rules(2, false));
        score(&mut ledger, &[Side::A, Side::A]);
        let err = ledger.undo_last_goal().unwrap_err();
        assert!(matches!(err, LedgerError::IllegalState(_)));
        assert!(!ledger.is_legal_next_event(EventKind::Undo, Side::A));
        assert_eq!(ledger.current_state().score_a, 2);
    }

    #[test]
    fn undo_without_goal_fails() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        assert_eq!(ledger.undo_last_goal(), Err(LedgerError::EmptyLedger));

        ledger.record_goal(Side::A).unwrap();
        ledger.undo_last_goal().unwrap();
        assert_eq!(ledger.undo_last_goal(), Err(LedgerError::EmptyLedger));
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn undo_targets_latest_active_goal() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        score(&mut ledger, &[Side::A, Side::B]);
        let first_goal = ledger.events()[0].id;
        let second_goal = ledger.events()[1].id;

        ledger.undo_last_goal().unwrap();
        let undo = ledger.last_event().unwrap();
        assert_eq!(undo.kind, EventKind::Undo);
        assert_eq!(undo.target, Some(second_goal));
        assert_eq!(undo.team, Side::B);

        let state = ledger.undo_last_goal().unwrap();
        assert_eq!(ledger.last_event().unwrap().target, Some(first_goal));
        assert_eq!(state, MatchState::default());
    }

    #[test]
    fn sealed_ledger_rejects_everything() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        ledger.record_goal(Side::A).unwrap();
        ledger.seal();

        assert_eq!(ledger.record_goal(Side::B), Err(LedgerError::Sealed));
        assert_eq!(ledger.undo_last_goal(), Err(LedgerError::Sealed));
        assert_eq!(
            ledger.ingest(remote_goal(Side::B, 2), Instant::now()),
            Err(LedgerError::Sealed)
        );
        assert!(!ledger.is_legal_next_event(EventKind::Goal, Side::A));
        assert_eq!(ledger.current_state().score_a, 1);
    }

    #[test]
    fn current_state_is_idempotent() {
        let mut ledger = ScoreLedger::new(rules(10, true));
        score(&mut ledger, &[Side::A, Side::B, Side::B]);
        ledger.undo_last_goal().unwrap();

        let first = ledger.current_state();
        for _ in 0..5 {
            assert_eq!(ledger.current_state(), first);
        }
    }

    #[test]
    fn total_score_matches_active_goals_for_mixed_sequences() {
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..50 {
            let mut ledger = ScoreLedger::new(rules(6, true));
            for _ in 0..40 {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let roll = (seed >> 33) % 3;
                let _ = match roll {
                    0 => ledger.record_goal(Side::A),
                    1 => ledger.record_goal(Side::B),
                    _ => ledger.undo_last_goal(),
                };

                let undone = ledger.undone_goals();
                let active = ledger
                    .events()
                    .iter()
                    .filter(|event| event.kind == EventKind::Goal && !undone.contains(&event.id))
                    .count() as u32;
                let state = ledger.current_state();
                assert_eq!(state.score_a + state.score_b, active);
                assert_eq!(
                    state.is_complete,
                    state.score_a >= 6 || state.score_b >= 6
                );
            }
        }
    }

    #[test]
    fn winner_is_recomputed_after_reopen() {
        let mut ledger = ScoreLedger::new(rules(2, true));
        score(&mut ledger, &[Side::A, Side::A]);
        ledger.undo_last_goal().unwrap();
        let state = ledger.record_goal(Side::B).unwrap();
        assert!(!state.is_complete);
        let state = ledger.record_goal(Side::B).unwrap();
        assert_eq!(state.winner, Some(Side::B));
        assert_eq!((state.score_a, state.score_b), (1, 2));
    }

    #[test]
    fn duplicate_delivery_does_not_double_count() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        let goal = remote_goal(Side::A, 1);

        let outcome = ledger.ingest(goal.clone(), Instant::now()).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Applied {
                applied: 1,
                rejected: Vec::new()
            }
        );
        assert_eq!(
            ledger.ingest(goal.clone(), Instant::now()),
            Err(LedgerError::DuplicateEvent(goal.id))
        );
        assert_eq!(ledger.current_state().score_a, 1);
    }

    #[test]
    fn gap_is_buffered_then_drained() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        let now = Instant::now();

        let third = remote_goal(Side::B, 3);
        let second = remote_goal(Side::A, 2);
        let first = remote_goal(Side::A, 1);

        assert_eq!(
            ledger.ingest(third, now).unwrap(),
            IngestOutcome::Buffered { expected: 1 }
        );
        assert_eq!(
            ledger.ingest(second, now).unwrap(),
            IngestOutcome::Buffered { expected: 1 }
        );
        assert_eq!(ledger.current_state(), MatchState::default());
        assert!(matches!(
            ledger.record_goal(Side::A),
            Err(LedgerError::IllegalState(_))
        ));

        let outcome = ledger.ingest(first, now).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Applied {
                applied: 3,
                rejected: Vec::new()
            }
        );
        assert_eq!(ledger.pending_len(), 0);
        let state = ledger.current_state();
        assert_eq!((state.score_a, state.score_b), (2, 1));
        let sequences: Vec<u64> = ledger.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn stale_sequence_is_rejected() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        ledger.record_goal(Side::A).unwrap();

        let err = ledger
            .ingest(remote_goal(Side::B, 1), Instant::now())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::OutOfOrderEvent {
                expected: 2,
                received: 1
            }
        );
    }

    #[test]
    fn buffer_capacity_is_bounded() {
        let mut ledger = ScoreLedger::new(MatchRules::default()).with_pending_capacity(1);
        let now = Instant::now();
        ledger.ingest(remote_goal(Side::A, 3), now).unwrap();
        assert_eq!(
            ledger.ingest(remote_goal(Side::A, 4), now),
            Err(LedgerError::BufferFull { capacity: 1 })
        );
    }

    #[test]
    fn overdue_gap_requires_reconciliation() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        let received = Instant::now();
        ledger.ingest(remote_goal(Side::A, 2), received).unwrap();

        let max_wait = Duration::from_millis(500);
        assert!(ledger.overdue_gap(received, max_wait).is_ok());
        assert_eq!(
            ledger.overdue_gap(received + Duration::from_secs(1), max_wait),
            Err(LedgerError::OutOfOrderEvent {
                expected: 1,
                received: 2
            })
        );

        let pending = ledger.take_pending();
        assert_eq!(pending.len(), 1);
        assert!(ledger.overdue_gap(received + Duration::from_secs(1), max_wait).is_ok());
    }

    #[test]
    fn gap_age_counts_from_the_earliest_arrival() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        let opened = Instant::now();
        let max_wait = Duration::from_secs(2);

        ledger.ingest(remote_goal(Side::A, 5), opened).unwrap();
        ledger
            .ingest(remote_goal(Side::B, 3), opened + Duration::from_millis(1900))
            .unwrap();
        assert_eq!(ledger.gap_opened_at(), Some(opened));

        assert_eq!(
            ledger.overdue_gap(opened + Duration::from_millis(2100), max_wait),
            Err(LedgerError::OutOfOrderEvent {
                expected: 1,
                received: 3
            })
        );
    }

    #[test]
    fn remote_undo_must_match_goal_team() {
        let mut ledger = ScoreLedger::new(MatchRules::default());
        let goal = remote_goal(Side::A, 1);
        ledger.ingest(goal.clone(), Instant::now()).unwrap();

        let mut undo = ScoreEvent::undo(&goal, 2, SystemTime::now());
        undo.team = Side::B;
        assert!(matches!(
            ledger.ingest(undo, Instant::now()),
            Err(LedgerError::InvalidEvent { .. })
        ));

        let undo = ScoreEvent::undo(&goal, 2, SystemTime::now());
        ledger.ingest(undo.clone(), Instant::now()).unwrap();
        assert_eq!(ledger.current_state().score_a, 0);

        let mut again = ScoreEvent::undo(&goal, 3, SystemTime::now());
        again.target = undo.target;
        assert!(matches!(
            ledger.ingest(again, Instant::now()),
            Err(LedgerError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn illegal_buffered_successor_is_reported() {
        let mut ledger = ScoreLedger::new(rules(1, false));
        let now = Instant::now();
        ledger.ingest(remote_goal(Side::B, 2), now).unwrap();

        let outcome = ledger.ingest(remote_goal(Side::A, 1), now).unwrap();
        match outcome {
            IngestOutcome::Applied { applied, rejected } => {
                assert_eq!(applied, 1);
                assert_eq!(rejected.len(), 1);
                assert!(matches!(rejected[0], LedgerError::IllegalState(_)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(ledger.current_state().winner, Some(Side::A));
    }

    #[test]
    fn rebuild_from_events_yields_same_state() {
        let mut ledger = ScoreLedger::new(rules(5, true));
        score(&mut ledger, &[Side::A, Side::B, Side::A, Side::A]);
        ledger.undo_last_goal().unwrap();
        ledger.record_goal(Side::B).unwrap();

        let mut shuffled = ledger.events().to_vec();
        shuffled.reverse();
        let rebuilt = ScoreLedger::from_events(ledger.rules(), shuffled).unwrap();
        assert_eq!(rebuilt.current_state(), ledger.current_state());
        assert_eq!(rebuilt.events(), ledger.events());
    }

    #[test]
    fn rebuild_rejects_holes() {
        let events = vec![remote_goal(Side::A, 1), remote_goal(Side::A, 3)];
        assert_eq!(
            ScoreLedger::from_events(MatchRules::default(), events).unwrap_err(),
            LedgerError::OutOfOrderEvent {
                expected: 2,
                received: 3
            }
        );
    }
}
