// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Real-time channel.
//!
//! Each WebSocket session relays every broadcast [`ServerEvent`] to its
//! client and forwards the client's `emergency_alert` and `stop_alert`
//! events to the alert coordinator. Rejections go back to the requesting
//! session only, as an `error` event.

use crate::error::AppError;
use crate::models::{EmergencyAlertEvent, Requester, StopAlertRequest};
use crate::services::alert::CLEAR_DENIED_MESSAGE;
use crate::services::{AlertHandle, ClearOutcome, ServerEvent};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Inbound frame: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Events a client may send.
#[derive(Debug)]
pub enum ClientEvent {
    EmergencyAlert(EmergencyAlertEvent),
    StopAlert(StopAlertRequest),
}

impl ClientEvent {
    /// Parse a text frame. The error is the message returned to the client.
    pub fn parse(text: &str) -> Result<Self, String> {
        let frame: ClientFrame =
            serde_json::from_str(text).map_err(|e| format!("Malformed event: {}", e))?;

        match frame.event.as_str() {
            "emergency_alert" => serde_json::from_value(frame.data)
                .map(ClientEvent::EmergencyAlert)
                .map_err(|e| format!("Invalid emergency_alert payload: {}", e)),
            "stop_alert" if frame.data.is_null() => {
                Ok(ClientEvent::StopAlert(StopAlertRequest::default()))
            }
            "stop_alert" => serde_json::from_value(frame.data)
                .map(ClientEvent::StopAlert)
                .map_err(|e| format!("Invalid stop_alert payload: {}", e)),
            other => Err(format!("Unknown event: {}", other)),
        }
    }
}

/// Handle one client frame. Returns the event to send back to this
/// session only, if any; everything shared goes through the broadcaster.
pub async fn handle_client_frame(alerts: &AlertHandle, text: &str) -> Option<ServerEvent> {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(message) => {
            tracing::warn!(error = %message, "Rejected WebSocket frame");
            return Some(ServerEvent::error(message));
        }
    };

    match event {
        ClientEvent::EmergencyAlert(event) => match alerts.raise(event).await {
            // The chat record and fan-out keep running once their handles drop.
            Ok(_receipt) => None,
            Err(AppError::BadRequest(details)) => {
                tracing::warn!(error = %details, "Rejected invalid emergency alert");
                Some(ServerEvent::error(format!("Invalid emergency alert: {}", details)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to raise emergency alert");
                Some(ServerEvent::error("Alert service unavailable"))
            }
        },
        ClientEvent::StopAlert(request) => match alerts.clear(Requester::from(&request)).await {
            Ok(ClearOutcome::Denied) => Some(ServerEvent::error(CLEAR_DENIED_MESSAGE)),
            Ok(_) => None,
            Err(e) => {
                tracing::error!(error = %e, "Failed to stop emergency alert");
                Some(ServerEvent::error("Alert service unavailable"))
            }
        },
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.broadcaster.subscribe();

    tracing::info!(
        sessions = state.broadcaster.session_count(),
        "Client connected"
    );

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_frame(&state.alerts, text.as_str()).await {
                        if send_event(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered by axum.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Client disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(body) => sender.send(Message::Text(body.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, event = event.name(), "Failed to serialize event");
            Ok(())
        }
    }
}
