//! Directory store: chat history and push registrations.
//!
//! The alert core and routes depend only on [`DirectoryStore`]; Firestore
//! backs it in production and [`MemoryStore`] in tests and local runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{ChatLogEntry, DeviceRegistration, Role};
use async_trait::async_trait;

/// Newest entries kept per forum channel.
pub const CHANNEL_HISTORY_LIMIT: usize = 100;

/// Collection names as constants.
pub mod collections {
    pub const FORUM_MESSAGES: &str = "forum_messages";
    /// Push registrations (keyed by encoded token)
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}

/// Persistence operations the service needs. Each write stands alone;
/// no operation spans multiple entities.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Insert or refresh a registration, keyed by its token.
    async fn upsert_registration(&self, registration: &DeviceRegistration)
        -> Result<(), AppError>;

    /// All registrations, or only those of one role.
    async fn list_registrations(
        &self,
        role: Option<Role>,
    ) -> Result<Vec<DeviceRegistration>, AppError>;

    /// Remove a registration by token. Missing tokens are not an error.
    async fn delete_registration(&self, token: &str) -> Result<(), AppError>;

    /// Append an immutable chat entry.
    async fn append_chat_entry(&self, entry: &ChatLogEntry) -> Result<(), AppError>;

    /// Newest `limit` entries of a channel, oldest first.
    async fn recent_chat_entries(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, AppError>;

    /// Delete all but the newest `keep` entries of a channel.
    /// Returns the number of entries deleted.
    async fn trim_channel(&self, channel: &str, keep: usize) -> Result<usize, AppError>;
}

/// Document ID for a registration. Tokens may contain characters that are
/// not valid in document paths.
pub(crate) fn registration_doc_id(token: &str) -> String {
    urlencoding::encode(token).into_owned()
}
