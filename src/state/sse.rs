use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// SSE-specific sub-state carved out from [`super::AppState`].
pub struct SseState {
    lobby: SseHub,
    matches: DashMap<Uuid, SseHub>,
    match_capacity: usize,
}

impl SseState {
    /// Build the SSE sub-tree with per-stream channel capacities.
    pub fn new(lobby_capacity: usize, match_capacity: usize) -> Self {
        Self {
            lobby: SseHub::new(lobby_capacity),
            matches: DashMap::new(),
            match_capacity,
        }
    }

    /// Hub carrying match creation and phase changes for every match.
    pub fn lobby(&self) -> &SseHub {
        &self.lobby
    }

    /// Hub of a single match, created on first use.
    pub fn match_hub(&self, match_id: Uuid) -> SseHub {
        self.matches
            .entry(match_id)
            .or_insert_with(|| SseHub::new(self.match_capacity))
            .clone()
    }

    /// Drop the hub of a match once nobody listens to it anymore.
    pub fn release_match_hub(&self, match_id: Uuid) {
        self.matches
            .remove_if(&match_id, |_, hub| hub.receiver_count() == 0);
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
#[derive(Clone)]
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
