// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Real-time broadcast hub.
//!
//! Every connected WebSocket session holds a receiver. A broadcast is
//! delivered at most once to each session connected at that moment; there
//! is no replay for sessions that connect later or fall behind.

use crate::models::{ChatLogEntry, EmergencyAlertEvent};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events buffered per session before a slow session starts skipping.
pub const DEFAULT_CAPACITY: usize = 256;

/// Events pushed from the server to clients.
///
/// Serialized as `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// An SOS alert was raised (sent to all).
    EmergencyAlert(EmergencyAlertEvent),
    /// The active alert was cleared (sent to all).
    StopAlert,
    /// A chat entry was posted (sent to all).
    ForumMessage(ChatLogEntry),
    /// A request from this session was rejected (sent to the requester only).
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::EmergencyAlert(_) => "emergency_alert",
            ServerEvent::StopAlert => "stop_alert",
            ServerEvent::ForumMessage(_) => "forum_message",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// Fan-out of server events to every connected session.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<ServerEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new session.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Number of sessions currently connected.
    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send an event to every connected session. Fire-and-forget: returns
    /// the number of sessions it was queued for (zero when nobody listens).
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(sessions) => {
                tracing::debug!(event = name, sessions, "Broadcast event");
                sessions
            }
            Err(_) => {
                tracing::debug!(event = name, "Broadcast with no connected sessions");
                0
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
