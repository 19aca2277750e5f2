use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::events::EventHub;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}

/// Unregisters the client when the connection (and with it the stream) is
/// dropped, so disconnects promptly shrink the registered set.
struct StreamGuard {
    hub: Arc<EventHub>,
    client_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.hub.unregister(&self.client_id);
    }
}

async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = uuid::Uuid::now_v7().to_string();
    let rx = state.hub.subscribe(&client_id);
    tracing::debug!("event stream opened for client {}", client_id);

    let guard = StreamGuard {
        hub: state.hub.clone(),
        client_id,
    };

    let ready = stream::once(async { Ok::<Event, Infallible>(Event::default().event("ready").data("{}")) });
    let broadcasts = ReceiverStream::new(rx).map(move |frame| {
        let _keep_registered = &guard;
        Ok::<Event, Infallible>(
            Event::default()
                .event(frame.name.clone())
                .data(frame.data.clone()),
        )
    });

    Sse::new(ready.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
