use actix_web::{HttpResponse, web::Bytes};
use futures_util::stream;
use serde::Serialize;
use tokio::sync::watch;

use crate::service::subscription::Subscription;

/**
 * Turns a subscription feed into a `text/event-stream` response. Every value becomes one
 * `data:` event. The subscription lives as long as the response stream, so a client
 * disconnecting ends the feed.
 *
 * # Arguments
 * `receiver`: Latest value delivered by the subscription callback, `None` until the first one.
 * A client reading slower than the feed changes only gets the newest value.
 * `subscription`: The feed producing the values.
 */
pub fn event_stream<T: Serialize + 'static>(receiver: watch::Receiver<Option<T>>, subscription: Subscription) -> HttpResponse {
    let events = stream::unfold((receiver, subscription), |(mut receiver, subscription)| async move {
        let event = next_event(&mut receiver).await?;
        Some((Ok::<Bytes, actix_web::Error>(event), (receiver, subscription)))
    });
    HttpResponse::Ok().content_type("text/event-stream").insert_header(("Cache-Control", "no-cache")).streaming(events)
}

/**
 * Waits for a value not yet sent to the client. `None` once the feed has ended.
 */
async fn next_event<T: Serialize>(receiver: &mut watch::Receiver<Option<T>>) -> Option<Bytes> {
    loop {
        receiver.changed().await.ok()?;
        if let Some(event) = receiver.borrow_and_update().as_ref().map(encode_event) {
            return Some(Bytes::from(event));
        }
    }
}

/**
 * Encodes one server-sent event. Values that cannot be encoded become a comment line.
 */
fn encode_event<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(err) => {
            tracing::error!("Failed to encode event: {}", err);
            ": encode error\n\n".to_string()
        }
    }
}
