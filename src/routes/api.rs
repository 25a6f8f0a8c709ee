// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP API routes: push registration, alert snapshot and forum channels.

use crate::db::CHANNEL_HISTORY_LIMIT;
use crate::error::{AppError, Result};
use crate::models::{
    ActiveAlert, ChatLogEntry, DeviceRegistration, PostForumRequest, SubscribeRequest,
    ALERT_CHANNEL,
};
use crate::models::subscription::redact_token;
use crate::services::{Audience, PushMessage, ServerEvent};
use crate::time_utils::now_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Characters of a forum post quoted in its push notification.
const FORUM_PREVIEW_CHARS: usize = 50;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/subscribe", post(subscribe))
        .route("/api/alert", get(get_alert))
        .route("/api/forum", post(post_forum))
        .route("/api/forum/{channel}", get(get_forum))
        .route("/api/debug/subscriptions", get(debug_subscriptions))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SuccessResponse {
    pub success: bool,
}

// ─── Push Registration ───────────────────────────────────────

/// Register (or refresh) a device for push notifications.
async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>)> {
    req.validate()?;

    let token = req.token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("token must not be blank".to_string()));
    }

    let registration = DeviceRegistration {
        token: token.to_string(),
        user_id: req.user_id.trim().to_string(),
        role: req.role,
        updated_at: now_rfc3339(),
    };

    state.db.upsert_registration(&registration).await?;

    tracing::info!(
        token = %registration.redacted_token(),
        user_id = %registration.user_id,
        role = registration.role.as_str(),
        "Push registration saved"
    );

    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

/// Redacted listing of registrations.
#[derive(Serialize)]
pub struct DebugSubscriptionsResponse {
    pub success: bool,
    pub count: usize,
    pub tokens: Vec<String>,
}

async fn debug_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DebugSubscriptionsResponse>> {
    let registrations = state.db.list_registrations(None).await?;
    let tokens: Vec<String> = registrations
        .iter()
        .map(|r| redact_token(&r.token))
        .collect();

    Ok(Json(DebugSubscriptionsResponse {
        success: true,
        count: tokens.len(),
        tokens,
    }))
}

// ─── Alert Snapshot ──────────────────────────────────────────

/// Current alert, for clients that connect after it was raised.
#[derive(Serialize)]
pub struct AlertSnapshotResponse {
    pub active: Option<ActiveAlert>,
}

async fn get_alert(State(state): State<Arc<AppState>>) -> Result<Json<AlertSnapshotResponse>> {
    let active = state.alerts.current().await?;
    Ok(Json(AlertSnapshotResponse { active }))
}

// ─── Forum ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ForumHistoryResponse {
    pub success: bool,
    pub messages: Vec<ChatLogEntry>,
}

#[derive(Serialize)]
pub struct ForumPostResponse {
    pub success: bool,
    pub message: ChatLogEntry,
}

/// Most recent entries of a channel, oldest first.
async fn get_forum(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<ForumHistoryResponse>> {
    let messages = state
        .db
        .recent_chat_entries(&channel, CHANNEL_HISTORY_LIMIT)
        .await?;

    Ok(Json(ForumHistoryResponse {
        success: true,
        messages,
    }))
}

/// Post to a channel, echo it to every session and notify devices.
async fn post_forum(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PostForumRequest>,
) -> Result<Json<ForumPostResponse>> {
    req.validate()?;
    if req.is_empty() {
        return Err(AppError::BadRequest(
            "post needs text or an image".to_string(),
        ));
    }

    let entry = req.into_entry();
    state.db.append_chat_entry(&entry).await?;

    match state
        .db
        .trim_channel(&entry.channel, CHANNEL_HISTORY_LIMIT)
        .await
    {
        Ok(0) => {}
        Ok(deleted) => {
            tracing::debug!(channel = %entry.channel, deleted, "Trimmed forum channel")
        }
        Err(e) => tracing::warn!(error = %e, channel = %entry.channel, "Failed to trim forum channel"),
    }

    state
        .broadcaster
        .broadcast(ServerEvent::ForumMessage(entry.clone()));

    // Alert entries already produce their own SOS push.
    if entry.channel != ALERT_CHANNEL {
        state
            .push
            .spawn_notify(Audience::Everyone, forum_push_message(&entry));
    }

    Ok(Json(ForumPostResponse {
        success: true,
        message: entry,
    }))
}

fn forum_push_message(entry: &ChatLogEntry) -> PushMessage {
    let mut preview: String = entry.text.chars().take(FORUM_PREVIEW_CHARS).collect();
    if entry.text.chars().count() > FORUM_PREVIEW_CHARS {
        preview.push('…');
    }

    PushMessage::new(
        format!("💬 Forum: {}", entry.channel),
        format!("{}: {}", entry.user, preview),
    )
    .with_data("channel", entry.channel.clone())
    .with_data("click_action", "/")
}
