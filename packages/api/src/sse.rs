// ABOUTME: Server-Sent Events stream helpers
// ABOUTME: Standard keep-alive settings and JSON event framing for replay streams

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;

/// Helper to create an SSE response with standard keep-alive settings
pub fn create_sse_response<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Helper to create an SSE event from JSON-serializable data. A payload
/// that fails to serialize degrades to an empty event of the same type
/// rather than killing the stream.
pub fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    match serde_json::to_string(data) {
        Ok(json_data) => Event::default().event(event_type).data(json_data),
        Err(_) => Event::default().event(event_type).data("{}"),
    }
}
