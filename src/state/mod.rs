pub mod ledger;
pub mod session;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{match_store::MatchStore, models::MatchEntity},
    error::ServiceError,
    services::persistence::PersistenceQueue,
    state::{session::MatchSession, state_machine::MatchPhase},
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{sse::SseState, state_machine::MatchEvent};

/// Application state shared by every handler and background task.
pub type SharedState = Arc<AppState>;
/// A live match guarded by its own lock; every ledger mutation goes through it.
pub type SharedSession = Arc<Mutex<MatchSession>>;
/// Upper bound on the persistence step of a lifecycle transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

const LOBBY_SSE_CAPACITY: usize = 32;
const MATCH_SSE_CAPACITY: usize = 64;

/// Central application state storing live matches, SSE hubs and the storage handle.
pub struct AppState {
    config: AppConfig,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    sessions: DashMap<Uuid, SharedSession>,
    persistence: DashMap<Uuid, PersistenceQueue>,
    sse: SseState,
    degraded: watch::Sender<bool>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::build(config, None)
    }

    /// Construct the state with a storage backend already installed.
    pub fn with_store(config: AppConfig, store: Arc<dyn MatchStore>) -> SharedState {
        Self::build(config, Some(store))
    }

    fn build(config: AppConfig, store: Option<Arc<dyn MatchStore>>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(store.is_none());
        Arc::new(Self {
            config,
            match_store: RwLock::new(store),
            sessions: DashMap::new(),
            persistence: DashMap::new(),
            sse: SseState::new(LOBBY_SSE_CAPACITY, MATCH_SSE_CAPACITY),
            degraded: degraded_tx,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Loaded application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Same as [`AppState::match_store`] but fails in degraded mode.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Broadcast hub used for the lobby SSE stream.
    pub fn lobby_sse(&self) -> &SseHub {
        self.sse.lobby()
    }

    /// Broadcast hub used for the stream of a single match.
    pub fn match_sse(&self, match_id: Uuid) -> SseHub {
        self.sse.match_hub(match_id)
    }

    /// Forget the hub of a match whose last subscriber left.
    pub fn release_match_sse(&self, match_id: Uuid) {
        self.sse.release_match_hub(match_id);
    }

    /// Registry of the live match sessions.
    pub fn sessions(&self) -> &DashMap<Uuid, SharedSession> {
        &self.sessions
    }

    /// Per-match persistence writers.
    pub fn persistence_queues(&self) -> &DashMap<Uuid, PersistenceQueue> {
        &self.persistence
    }

    /// Run a referee-driven lifecycle transition on `session`.
    ///
    /// The transition is planned, `work` receives the header as it will look
    /// once applied (typically to persist it), and the plan is applied on
    /// success or aborted on failure or timeout. The session stays locked for
    /// the whole sequence.
    pub async fn run_transition<F, Fut, T>(
        &self,
        session: &SharedSession,
        event: MatchEvent,
        work: F,
    ) -> Result<(T, MatchPhase), ServiceError>
    where
        F: FnOnce(MatchEntity) -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let mut guard = session.lock().await;
        let match_id = guard.id;
        let plan = guard.plan_lifecycle(event)?;
        let preview = guard.preview_entity(&plan);

        let work_future = work(preview);
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = guard.abort_lifecycle(plan.id) {
                        warn!(
                            %match_id,
                            event = ?event,
                            plan_id = %plan.id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = guard.apply_lifecycle(plan.id)?;
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = guard.abort_lifecycle(plan.id) {
                    warn!(
                        %match_id,
                        event = ?event,
                        plan_id = %plan.id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                Err(err)
            }
        }
    }
}
