//! Server-sent events for a running turn

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::agent::AgentEvent;

/// Forward agent events until the turn ends
pub fn event_stream(mut rx: mpsc::Receiver<AgentEvent>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            match Event::default().event(event.name()).json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!(error = %e, "Failed to encode SSE event"),
            }
            if terminal {
                debug!("event_stream: terminal event sent");
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
