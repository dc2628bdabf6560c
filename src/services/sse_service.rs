use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    dto::{
        score::ScoreStateResponse,
        sse::{Handshake, ServerEvent},
    },
    error::ServiceError,
    services::match_service,
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";

/// Subscribe to the lobby stream.
pub fn subscribe_lobby(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.lobby_sse().subscribe()
}

/// Subscribe to the stream of one match.
///
/// Fails when the match is unknown. The receiver is registered before the
/// score snapshot is taken so no update can fall between the two.
pub async fn subscribe_match(
    state: &SharedState,
    match_id: Uuid,
) -> Result<(broadcast::Receiver<ServerEvent>, ScoreStateResponse), ServiceError> {
    let session = match_service::load_session(state, match_id).await?;
    let receiver = state.match_sse(match_id).subscribe();
    let guard = session.lock().await;
    let snapshot = ScoreStateResponse::new(match_id, guard.phase(), guard.state());
    Ok((receiver, snapshot))
}

/// Build the first message sent on a freshly opened stream.
pub fn handshake(
    state: &SharedState,
    kind: &StreamKind,
    snapshot: Option<ScoreStateResponse>,
) -> Option<Event> {
    let (stream, message) = match kind {
        StreamKind::Lobby => ("lobby", "lobby stream connected".to_string()),
        StreamKind::Match(id) => ("match", format!("match {id} stream connected")),
    };
    let payload = Handshake {
        stream: stream.into(),
        message,
        degraded: state.is_degraded(),
        state: snapshot,
    };
    let message = ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &payload).ok()?;
    Some(to_event(message))
}

/// Identifies the target SSE stream so we can perform stream-specific
/// bookkeeping when the connection is torn down.
#[derive(Clone)]
pub enum StreamKind {
    Lobby,
    Match(Uuid),
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    state: SharedState,
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
    first: Option<Event>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(event) = first {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "SSE subscriber lagging; skipping messages");
                            continue;
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Lobby => tracing::info!("Lobby SSE stream disconnected"),
            StreamKind::Match(match_id) => {
                drop(receiver);
                state.release_match_sse(match_id);
                tracing::info!(%match_id, "Match SSE stream disconnected")
            }
        }
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
