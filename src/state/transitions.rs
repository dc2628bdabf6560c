use crate::{
    dao::models::MatchEntity,
    error::ServiceError,
    services::sse_events::broadcast_phase_changed,
    state::{SharedSession, SharedState, state_machine::MatchEvent},
};

/// Execute a planned lifecycle transition, then broadcast the resulting phase change.
pub async fn run_transition_with_broadcast<F, Fut, T>(
    state: &SharedState,
    session: &SharedSession,
    event: MatchEvent,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce(MatchEntity) -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let match_id = session.lock().await.id;
    let (res, next) = state.run_transition(session, event, work).await?;
    broadcast_phase_changed(state, match_id, next);
    Ok(res)
}
