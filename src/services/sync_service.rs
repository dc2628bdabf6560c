//! Ingestion of events committed by other contributors to the same match and
//! reconciliation of the live ledger with the stored log.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::time::sleep_until;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::score::{IngestOutcomeDto, IngestResponse, ReconcileResponse, ScoreEventDto, ScoreStateResponse},
    error::ServiceError,
    services::{
        match_service::load_session,
        persistence::{self, PersistenceCommand},
        scoring_service::publish_update,
        sse_events::{broadcast_phase_changed, broadcast_score_state},
    },
    state::{
        SharedState,
        ledger::{LedgerError, ScoreEvent, ScoreLedger},
        session::{MatchSession, SessionIngest},
    },
};

/// Feed a remotely committed event into the live ledger.
///
/// Duplicates are acknowledged without effect and events ahead of a gap are
/// buffered. A stale event, a full buffer or a gap open for too long
/// rebuilds the ledger from storage.
pub async fn ingest(
    state: &SharedState,
    match_id: Uuid,
    event: ScoreEventDto,
) -> Result<IngestResponse, ServiceError> {
    let event = ScoreEvent::try_from(event).map_err(ServiceError::InvalidInput)?;
    let session = load_session(state, match_id).await?;
    let mut guard = session.lock().await;
    let now = Instant::now();
    let sequence = event.sequence;

    let outcome = match guard.ingest(event.clone(), now) {
        Ok(SessionIngest::Applied(update)) => {
            debug!(%match_id, sequence, applied = update.appended.len(), "remote event applied");
            publish_update(state, &guard, &update);
            IngestOutcomeDto::Applied
        }
        Ok(SessionIngest::Buffered { expected }) => {
            let max_wait = state.config().reorder.max_gap_wait;
            if let Err(err) = guard.ledger().overdue_gap(now, max_wait) {
                info!(%match_id, error = %err, "gap open for too long; reconciling");
                reconcile_locked(state, &mut guard, None).await?;
                IngestOutcomeDto::Reconciled
            } else {
                debug!(%match_id, sequence, expected, "remote event buffered");
                if guard.ledger().pending_len() == 1 {
                    watch_gap(state, match_id);
                }
                return Ok(IngestResponse {
                    outcome: IngestOutcomeDto::Buffered,
                    expected_sequence: Some(expected),
                    state: snapshot(&guard),
                });
            }
        }
        Err(LedgerError::DuplicateEvent(id)) => {
            debug!(%match_id, event_id = %id, "duplicate remote event ignored");
            IngestOutcomeDto::Duplicate
        }
        Err(err @ (LedgerError::OutOfOrderEvent { .. } | LedgerError::BufferFull { .. })) => {
            info!(%match_id, sequence, error = %err, "ledger out of step; reconciling");
            reconcile_locked(state, &mut guard, Some(event)).await?;
            IngestOutcomeDto::Reconciled
        }
        Err(err) => return Err(err.into()),
    };

    Ok(IngestResponse {
        outcome,
        expected_sequence: None,
        state: snapshot(&guard),
    })
}

/// Reconcile `match_id` once its reorder buffer has waited past the
/// configured bound, unless the missing event shows up first.
fn watch_gap(state: &SharedState, match_id: Uuid) {
    let weak = Arc::downgrade(state);
    tokio::spawn(async move {
        loop {
            let Some(state) = weak.upgrade() else { return };
            let Some(session) = state.sessions().get(&match_id).map(|entry| entry.value().clone())
            else {
                return;
            };
            let max_wait = state.config().reorder.max_gap_wait;

            let deadline = {
                let mut guard = session.lock().await;
                let Some(opened) = guard.ledger().gap_opened_at() else {
                    return;
                };
                match guard.ledger().overdue_gap(Instant::now(), max_wait) {
                    Ok(()) => opened + max_wait + Duration::from_millis(1),
                    Err(err) => {
                        info!(%match_id, error = %err, "gap open for too long; reconciling");
                        match reconcile_locked(&state, &mut guard, None).await {
                            Ok(()) => return,
                            Err(err) => {
                                warn!(%match_id, error = %err, "gap reconciliation failed; retrying");
                                Instant::now() + max_wait.max(Duration::from_millis(100))
                            }
                        }
                    }
                }
            };

            drop(session);
            drop(state);
            sleep_until(deadline.into()).await;
        }
    });
}

/// Rebuild the ledger of a match from the stored event log.
pub async fn reconcile(
    state: &SharedState,
    match_id: Uuid,
) -> Result<ReconcileResponse, ServiceError> {
    let session = load_session(state, match_id).await?;
    let mut guard = session.lock().await;
    reconcile_locked(state, &mut guard, None).await?;
    Ok(ReconcileResponse {
        events: guard.ledger().events().len(),
        state: snapshot(&guard),
    })
}

/// Replace the ledger with the stored log, then replay the buffered events and
/// `trigger` on top of it.
///
/// Events still cut off by a gap afterwards are not in storage yet; they are
/// dropped so that local scoring resumes, and a later reconciliation picks
/// them up once committed.
async fn reconcile_locked(
    state: &SharedState,
    session: &mut MatchSession,
    trigger: Option<ScoreEvent>,
) -> Result<(), ServiceError> {
    let match_id = session.id;
    persistence::flush(state, match_id).await;

    let store = state.require_match_store().await?;
    let stored: Vec<ScoreEvent> = store
        .load_events(match_id)
        .await?
        .into_iter()
        .map(ScoreEvent::from)
        .collect();
    let rebuilt = ScoreLedger::from_events(session.ledger().rules(), stored)?
        .with_pending_capacity(state.config().reorder.max_pending_events);

    let local = session.ledger().events().len();
    let replay = session.take_pending();
    let phase_change = session.replace_ledger(rebuilt);
    persistence::enqueue(state, match_id, PersistenceCommand::Resync);
    info!(
        %match_id,
        local,
        stored = session.ledger().events().len(),
        replay = replay.len(),
        "ledger rebuilt from storage"
    );

    broadcast_score_state(state, match_id, session.phase(), session.state());
    if let Some(phase) = phase_change {
        broadcast_phase_changed(state, match_id, phase);
    }

    let now = Instant::now();
    for event in replay.into_iter().chain(trigger) {
        let sequence = event.sequence;
        match session.ingest(event, now) {
            Ok(SessionIngest::Applied(update)) => publish_update(state, session, &update),
            Ok(SessionIngest::Buffered { .. }) | Err(LedgerError::DuplicateEvent(_)) => {}
            Err(err) => warn!(%match_id, sequence, error = %err, "event dropped after reconciliation"),
        }
    }

    let stranded = session.take_pending();
    if !stranded.is_empty() {
        warn!(
            %match_id,
            dropped = stranded.len(),
            expected = session.ledger().next_sequence(),
            "events still behind a gap dropped after reconciliation"
        );
    }

    Ok(())
}

fn snapshot(session: &MatchSession) -> ScoreStateResponse {
    ScoreStateResponse::new(session.id, session.phase(), session.state())
}
