//! HTTP side: the `/status` WebSocket endpoint that relays hub messages to
//! viewers, plus a static file fallback for the viewer page.

use std::path::Path;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::select;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::{
    error::{DeliveryError, UpgradeError},
    frame::Message,
    hub::{Hub, Subscription},
};

pub const STATUS_PATH: &str = "/status";

pub fn router(hub: Hub, web_root: impl AsRef<Path>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status_socket))
        .fallback_service(ServeDir::new(web_root.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn status_socket(ws: WebSocketUpgrade, State(hub): State<Hub>) -> Response {
    ws.on_failed_upgrade(|error: axum::Error| {
        let error = UpgradeError(error);
        warn!(%error, "viewer not registered");
    })
    .on_upgrade(move |socket| serve_viewer(socket, hub))
}

/// Why a relay loop ended without a write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayEnd {
    ViewerClosed,
    HubClosed,
}

async fn serve_viewer(socket: WebSocket, hub: Hub) {
    let (sink, inbound) = socket.split();
    let _ = run_viewer(sink, inbound, &hub).await;
}

/// Registers a subscriber, relays until the viewer goes away, then
/// unregisters it. Registration only happens once the upgrade has completed,
/// and unregistration happens exactly once on every exit.
async fn run_viewer<S, I>(sink: S, inbound: I, hub: &Hub) -> Result<RelayEnd, DeliveryError>
where
    S: Sink<WsMessage, Error = axum::Error> + Unpin,
    I: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let mut subscription = hub.register().await;
    let id = subscription.id();
    info!(subscriber = %id, "viewer connected");

    let result = relay(sink, inbound, &mut subscription).await;
    hub.unregister(id).await;

    match &result {
        Ok(end) => info!(subscriber = %id, ?end, "viewer disconnected"),
        Err(error) => warn!(%error, "evicting viewer"),
    }
    result
}

async fn relay<S, I>(
    mut sink: S,
    mut inbound: I,
    subscription: &mut Subscription,
) -> Result<RelayEnd, DeliveryError>
where
    S: Sink<WsMessage, Error = axum::Error> + Unpin,
    I: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let subscriber = subscription.id();

    loop {
        select! {
            message = subscription.recv() => {
                let Some(payload) = message else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(RelayEnd::HubClosed);
                };
                sink.send(to_ws_message(payload))
                    .await
                    .map_err(|source| DeliveryError { subscriber, source })?;
            }
            frame = inbound.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | None => return Ok(RelayEnd::ViewerClosed),
                Some(Err(err)) => {
                    debug!(subscriber = %subscriber, error = %err, "viewer read failed");
                    return Ok(RelayEnd::ViewerClosed);
                }
                // Viewers have nothing to say; anything they send is ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Text frame when the payload is UTF-8, binary frame otherwise. The bytes
/// are forwarded unchanged either way.
pub fn to_ws_message(payload: Message) -> WsMessage {
    match std::str::from_utf8(&payload) {
        Ok(text) => WsMessage::Text(text.to_owned()),
        Err(_) => WsMessage::Binary(payload.to_vec()),
    }
}
