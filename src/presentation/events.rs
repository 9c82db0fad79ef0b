// Server-sent events - live snapshots and notifications for the dashboard
use crate::presentation::app_state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

/// Stream `reading` events whenever the published view changes and
/// `notification` events for everything sent to the notification sink.
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let readings = WatchStream::new(state.session.subscribe()).filter_map(|view| {
        futures::future::ready(Event::default().event("reading").json_data(&view).ok())
    });

    let notifications = BroadcastStream::new(state.notifier.subscribe()).filter_map(|received| {
        // a lagging client just misses notifications
        let event = received
            .ok()
            .and_then(|n| Event::default().event("notification").json_data(&n).ok());
        futures::future::ready(event)
    });

    let events = stream::select(readings, notifications)
        .take_until(state.shutdown.clone().cancelled_owned())
        .map(Ok);

    Sse::new(events).keep_alive(KeepAlive::default())
}
