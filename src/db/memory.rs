//! In-process directory store.
//!
//! Used by tests and by `DIRECTORY_STORE=memory` local runs. Data does not
//! survive a restart.

use crate::db::DirectoryStore;
use crate::error::AppError;
use crate::models::{ChatLogEntry, DeviceRegistration, Role};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    /// Keyed by token
    registrations: BTreeMap<String, DeviceRegistration>,
    /// Append order
    chat: Vec<ChatLogEntry>,
}

/// Memory-backed [`DirectoryStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a database error, to exercise
    /// degraded-store paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every stored chat entry of a channel, in append order.
    pub fn chat_entries(&self, channel: &str) -> Vec<ChatLogEntry> {
        self.lock()
            .chat
            .iter()
            .filter(|e| e.channel == channel)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the maps half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("write rejected (memory store)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn upsert_registration(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<(), AppError> {
        self.check_writable()?;
        self.lock()
            .registrations
            .insert(registration.token.clone(), registration.clone());
        Ok(())
    }

    async fn list_registrations(
        &self,
        role: Option<Role>,
    ) -> Result<Vec<DeviceRegistration>, AppError> {
        Ok(self
            .lock()
            .registrations
            .values()
            .filter(|r| role.map_or(true, |role| r.role == role))
            .cloned()
            .collect())
    }

    async fn delete_registration(&self, token: &str) -> Result<(), AppError> {
        self.check_writable()?;
        self.lock().registrations.remove(token);
        Ok(())
    }

    async fn append_chat_entry(&self, entry: &ChatLogEntry) -> Result<(), AppError> {
        self.check_writable()?;
        self.lock().chat.push(entry.clone());
        Ok(())
    }

    async fn recent_chat_entries(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, AppError> {
        let entries = self.chat_entries(channel);
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }

    async fn trim_channel(&self, channel: &str, keep: usize) -> Result<usize, AppError> {
        self.check_writable()?;
        let mut inner = self.lock();

        let in_channel = inner.chat.iter().filter(|e| e.channel == channel).count();
        let mut excess = in_channel.saturating_sub(keep);
        let deleted = excess;

        // Oldest entries come first in append order.
        inner.chat.retain(|e| {
            if excess > 0 && e.channel == channel {
                excess -= 1;
                false
            } else {
                true
            }
        });

        Ok(deleted)
    }
}
