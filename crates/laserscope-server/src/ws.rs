//! WebSocket observer channel
//!
//! Clients connect to /ws. Each completed packet arrives as a text message
//! with the packet metadata followed by a binary message with the samples.
//! A binary message of exactly one byte sets the analog output; anything
//! else a client sends is ignored.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use laserscope_core::stream::broadcaster::{Delivery, ObserverLink};
use laserscope_core::stream::packet::PacketFrame;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Bounded per-connection queue feeding one socket's send task
pub struct WsObserverLink {
    tx: mpsc::Sender<Arc<PacketFrame>>,
}

impl WsObserverLink {
    pub fn new(tx: mpsc::Sender<Arc<PacketFrame>>) -> Self {
        Self { tx }
    }
}

impl ObserverLink for WsObserverLink {
    fn try_deliver(&self, frame: &Arc<PacketFrame>) -> Delivery {
        match self.tx.try_send(Arc::clone(frame)) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Arc<PacketFrame>>(state.config.observer_queue.max(1));
    let id = state.broadcaster.connect(Box::new(WsObserverLink::new(tx)));

    // Metadata then samples, never interleaved with another packet
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender
                .send(Message::Text(frame.metadata.clone().into()))
                .await
                .is_err()
            {
                break;
            }
            if ws_sender
                .send(Message::Binary(frame.samples.to_vec().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let broadcaster = Arc::clone(&state.broadcaster);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    broadcaster.on_inbound(id, &data);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state.broadcaster.disconnect(id);
    tracing::debug!(observer = %id, "WebSocket client disconnected");
}
