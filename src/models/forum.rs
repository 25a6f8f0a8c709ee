// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Forum chat log model for storage and API.

use crate::time_utils::now_rfc3339;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Channel reserved for entries derived from SOS alerts.
pub const ALERT_CHANNEL: &str = "ALERTAS";

/// Kind of chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Regular neighbour message
    #[default]
    Text,
    /// System entry recording an SOS alert
    Alert,
}

/// Immutable chat log entry stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChatLogEntry {
    /// Unique entry ID (also used as document ID)
    pub id: String,
    /// Forum channel name
    pub channel: String,
    /// Display name of the author
    pub user: String,
    /// Message body
    pub text: String,
    /// Optional image attachment (data URL or link)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Entry kind
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// When the entry was written (RFC 3339, millisecond precision)
    pub timestamp: String,
}

impl ChatLogEntry {
    /// Build a new entry stamped with a fresh ID and the current time.
    pub fn new(
        channel: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: channel.into(),
            user: user.into(),
            text: text.into(),
            image: None,
            kind,
            timestamp: now_rfc3339(),
        }
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }
}

/// Body of `POST /api/forum`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PostForumRequest {
    #[validate(length(min = 1, max = 64))]
    pub channel: String,
    #[validate(length(min = 1, max = 128))]
    pub user: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub image: Option<String>,
}

impl PostForumRequest {
    /// A post needs either text or an image.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.as_deref().map_or(true, str::is_empty)
    }

    pub fn into_entry(self) -> ChatLogEntry {
        ChatLogEntry::new(self.channel, self.user, self.text, self.kind).with_image(self.image)
    }
}
