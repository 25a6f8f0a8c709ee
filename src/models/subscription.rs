//! Push registration model for storage and API.

use crate::models::Role;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Number of token characters kept when logging or listing tokens.
const TOKEN_PREFIX_LEN: usize = 15;

/// A push-capable device endpoint stored in Firestore, keyed by token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    /// Cloud Messaging registration token (unique)
    pub token: String,
    /// Owning user ID
    pub user_id: String,
    /// Role of the owning user at registration time
    pub role: Role,
    /// Last time the registration was created or refreshed
    pub updated_at: String,
}

impl DeviceRegistration {
    /// Token in a form safe to log.
    pub fn redacted_token(&self) -> String {
        redact_token(&self.token)
    }
}

/// Body of `POST /api/subscribe`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[validate(length(min = 1, max = 4096))]
    pub token: String,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[serde(default)]
    pub role: Role,
}

/// Shorten a token to a loggable prefix.
pub fn redact_token(token: &str) -> String {
    match token.char_indices().nth(TOKEN_PREFIX_LEN) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}
