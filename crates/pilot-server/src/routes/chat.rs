use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{future, SinkExt, StreamExt};
use pilot::protocol::OutboundFrame;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::gateway::Channel;
use crate::state::AppState;

const OUTBOUND_BUFFER: usize = 64;

async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let span = info_span!("channel", id = %Uuid::new_v4());
        serve(socket, state).instrument(span)
    })
}

async fn serve(socket: WebSocket, state: AppState) {
    tracing::info!("channel opened");
    let (mut sink, stream) = socket.split();
    let (outbound, mut frames) = mpsc::channel::<OutboundFrame>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!(error = %e, "socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    // text frames until the caller closes or the transport fails
    let inbound = stream
        .take_while(|message| {
            if let Err(e) = message {
                debug!(error = %e, "socket read failed");
            }
            future::ready(matches!(message, Ok(m) if !matches!(m, Message::Close(_))))
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        });

    Channel::new(state, outbound).run(inbound).await;
    let _ = writer.await;
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ws/chat", get(handler))
        .with_state(state)
}
