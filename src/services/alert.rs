// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SOS alert coordinator.
//!
//! Owns the single [`ActiveAlert`]. All reads and writes go through an
//! actor task that processes one command at a time, so the owner check in
//! a clear and the reset that follows cannot interleave with another raise
//! or clear. Callers talk to it through the cloneable [`AlertHandle`].
//!
//! Inside the actor a raise only replaces the alert (last writer wins) and
//! broadcasts `emergency_alert`. The `ALERTAS` chat record (followed by
//! its `forum_message` echo) and the push fan-out run in their own tasks,
//! so a slow store or gateway never holds up later clears or snapshots.
//! Neither outcome affects the alert state.

use crate::db::DirectoryStore;
use crate::error::{AppError, Result};
use crate::models::{
    ActiveAlert, ChatLogEntry, EmergencyAlertEvent, MessageKind, Requester, Role, ALERT_CHANNEL,
};
use crate::services::broadcast::{Broadcaster, ServerEvent};
use crate::services::push::{Audience, FanoutReport, PushMessage, PushService};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use validator::Validate;

const COMMAND_BUFFER: usize = 64;

/// Author recorded on alert entries when the client sent no name.
const SYSTEM_AUTHOR: &str = "SYSTEM";

/// Private message sent to a client whose clear request was denied.
pub const CLEAR_DENIED_MESSAGE: &str = "You are not allowed to stop this alert.";

/// Result of a successful raise.
#[derive(Debug)]
pub struct RaiseReceipt {
    /// The alert now in effect.
    pub alert: ActiveAlert,
    /// The detached `ALERTAS` record. Resolves to the entry if the store
    /// accepted it.
    pub log_entry: JoinHandle<Option<ChatLogEntry>>,
    /// The detached push fan-out. Dropping it does not cancel delivery.
    pub fanout: JoinHandle<FanoutReport>,
}

/// Who cleared an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearedBy {
    Owner,
    Admin,
}

/// Result of a clear request.
#[derive(Debug, Clone, PartialEq)]
pub enum ClearOutcome {
    /// The alert was cleared and `stop_alert` broadcast.
    Cleared {
        alert: ActiveAlert,
        by: ClearedBy,
    },
    /// No alert was active; `stop_alert` was broadcast anyway so stray
    /// clients converge.
    NothingActive,
    /// The requester may not clear this alert. Nothing was broadcast.
    Denied,
}

/// Decide whether `requester` may clear `alert`. Admins may clear any
/// alert; anyone else only one they raised themselves.
pub fn authorize_clear(alert: &ActiveAlert, requester: &Requester) -> Option<ClearedBy> {
    if requester.role == Role::Admin {
        Some(ClearedBy::Admin)
    } else if requester.is_user(&alert.raised_by) {
        Some(ClearedBy::Owner)
    } else {
        None
    }
}

enum AlertCommand {
    Raise {
        event: EmergencyAlertEvent,
        reply: oneshot::Sender<RaiseReceipt>,
    },
    Clear {
        requester: Requester,
        reply: oneshot::Sender<ClearOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<ActiveAlert>>,
    },
}

/// Cloneable client of the coordinator task.
#[derive(Clone)]
pub struct AlertHandle {
    tx: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Validate and raise an alert, replacing any active one.
    pub async fn raise(&self, event: EmergencyAlertEvent) -> Result<RaiseReceipt> {
        event.validate()?;
        let (reply, rx) = oneshot::channel();
        self.request(AlertCommand::Raise { event, reply }, rx).await
    }

    /// Ask to clear the active alert.
    pub async fn clear(&self, requester: Requester) -> Result<ClearOutcome> {
        let (reply, rx) = oneshot::channel();
        self.request(AlertCommand::Clear { requester, reply }, rx)
            .await
    }

    /// The alert currently in effect, if any.
    pub async fn current(&self) -> Result<Option<ActiveAlert>> {
        let (reply, rx) = oneshot::channel();
        self.request(AlertCommand::Snapshot { reply }, rx).await
    }

    async fn request<T>(&self, command: AlertCommand, rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Alert coordinator stopped")))?;
        rx.await
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Alert coordinator dropped request")))
    }
}

/// The task owning the active alert.
pub struct AlertCoordinator {
    active: Option<ActiveAlert>,
    broadcaster: Broadcaster,
    store: Arc<dyn DirectoryStore>,
    push: PushService,
}

impl AlertCoordinator {
    /// Start the coordinator task. It stops once every handle is dropped.
    pub fn spawn(
        broadcaster: Broadcaster,
        store: Arc<dyn DirectoryStore>,
        push: PushService,
    ) -> AlertHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let coordinator = Self {
            active: None,
            broadcaster,
            store,
            push,
        };
        tokio::spawn(coordinator.run(rx));
        AlertHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<AlertCommand>) {
        tracing::debug!("Alert coordinator started");

        while let Some(command) = rx.recv().await {
            match command {
                AlertCommand::Raise { event, reply } => {
                    let receipt = self.raise(event);
                    let _ = reply.send(receipt);
                }
                AlertCommand::Clear { requester, reply } => {
                    let outcome = self.clear(&requester);
                    let _ = reply.send(outcome);
                }
                AlertCommand::Snapshot { reply } => {
                    let _ = reply.send(self.active.clone());
                }
            }
        }

        tracing::debug!("Alert coordinator stopped");
    }

    fn raise(&mut self, event: EmergencyAlertEvent) -> RaiseReceipt {
        let alert = ActiveAlert::from_event(&event, Utc::now());

        if let Some(previous) = self.active.replace(alert.clone()) {
            tracing::warn!(
                previous_house = %previous.house_label,
                previous_raised_by = %previous.raised_by,
                "Active alert overwritten by a new raise"
            );
        }

        tracing::warn!(
            category = ?alert.category,
            house = %alert.house_label,
            raised_by = %alert.raised_by,
            "SOS alert raised"
        );

        let headline = event.headline_label();
        let author = event
            .user_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(SYSTEM_AUTHOR)
            .to_string();
        let push_message = sos_push_message(&event, &headline, &author);

        self.broadcaster
            .broadcast(ServerEvent::EmergencyAlert(event));

        let entry = ChatLogEntry::new(
            ALERT_CHANNEL,
            author,
            format!("🚨 {} {}", headline, house_phrase(&alert.house_label)),
            MessageKind::Alert,
        );

        let log_entry = tokio::spawn(record_alert_entry(
            self.store.clone(),
            self.broadcaster.clone(),
            entry,
        ));

        let fanout = self.push.spawn_notify(Audience::Everyone, push_message);

        RaiseReceipt {
            alert,
            log_entry,
            fanout,
        }
    }

    fn clear(&mut self, requester: &Requester) -> ClearOutcome {
        let Some(alert) = self.active.take() else {
            tracing::debug!("Clear requested with no active alert");
            self.broadcaster.broadcast(ServerEvent::StopAlert);
            return ClearOutcome::NothingActive;
        };

        let Some(by) = authorize_clear(&alert, requester) else {
            tracing::warn!(
                requester = ?requester.user_id,
                raised_by = %alert.raised_by,
                "Unauthorized attempt to stop alert"
            );
            self.active = Some(alert);
            return ClearOutcome::Denied;
        };

        tracing::info!(
            by = ?by,
            house = %alert.house_label,
            "SOS alert stopped"
        );
        self.broadcaster.broadcast(ServerEvent::StopAlert);

        ClearOutcome::Cleared { alert, by }
    }
}

/// Append the alert's chat entry and echo it to every session once stored.
async fn record_alert_entry(
    store: Arc<dyn DirectoryStore>,
    broadcaster: Broadcaster,
    entry: ChatLogEntry,
) -> Option<ChatLogEntry> {
    match store.append_chat_entry(&entry).await {
        Ok(()) => {
            broadcaster.broadcast(ServerEvent::ForumMessage(entry.clone()));
            Some(entry)
        }
        Err(e) => {
            tracing::error!(error = %e, entry_id = %entry.id, "Failed to record alert in chat log");
            None
        }
    }
}

/// Where the emergency is, for chat and push copy. Neighbours without a
/// map label still raise alerts.
fn house_phrase(house_label: &str) -> String {
    if house_label.is_empty() {
        "at an unmarked house".to_string()
    } else {
        format!("at house #{}", house_label)
    }
}

/// Push notification announcing an SOS to every neighbour.
fn sos_push_message(event: &EmergencyAlertEvent, headline: &str, author: &str) -> PushMessage {
    let location = event
        .location
        .and_then(|point| serde_json::to_string(&point).ok())
        .unwrap_or_else(|| "null".to_string());

    PushMessage::new(
        "🚨 NEIGHBOURHOOD ALERT",
        format!(
            "Attention! {} {}. Neighbour: {}",
            headline,
            house_phrase(event.house_number.trim()),
            author
        ),
    )
    .with_data("type", "SOS")
    .with_data("houseNumber", event.house_number.trim())
    .with_data("location", location)
    .with_data("click_action", "/")
    .urgent("sos-alert")
}
