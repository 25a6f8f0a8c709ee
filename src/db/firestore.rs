// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Forum messages (append-only chat log, trimmed per channel)
//! - Subscriptions (push registrations keyed by token)
//!
//! Channel queries filter on `channel` and order on `timestamp`, which
//! needs a composite index on `forum_messages (channel ASC, timestamp DESC)`.

use crate::db::{collections, registration_doc_id, DirectoryStore};
use crate::error::AppError;
use crate::models::{ChatLogEntry, DeviceRegistration, Role};
use async_trait::async_trait;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. Every operation returns a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Delete documents in transactional batches.
    async fn batch_delete(&self, collection: &str, doc_ids: &[String]) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for FirestoreDb {
    // ─── Subscription Operations ─────────────────────────────────

    async fn upsert_registration(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SUBSCRIPTIONS)
            .document_id(registration_doc_id(&registration.token))
            .object(registration)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_registrations(
        &self,
        role: Option<Role>,
    ) -> Result<Vec<DeviceRegistration>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SUBSCRIPTIONS);

        let query = if let Some(role) = role {
            query.filter(move |q| q.field("role").eq(role.as_str()))
        } else {
            query
        };

        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete_registration(&self, token: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::SUBSCRIPTIONS)
            .document_id(registration_doc_id(token))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Forum Operations ────────────────────────────────────────

    async fn append_chat_entry(&self, entry: &ChatLogEntry) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::FORUM_MESSAGES)
            .document_id(&entry.id)
            .object(entry)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn recent_chat_entries(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, AppError> {
        let mut entries: Vec<ChatLogEntry> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FORUM_MESSAGES)
            .filter(|q| q.for_all([q.field("channel").eq(channel)]))
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit as u32)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        entries.reverse();
        Ok(entries)
    }

    async fn trim_channel(&self, channel: &str, keep: usize) -> Result<usize, AppError> {
        let stale: Vec<ChatLogEntry> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FORUM_MESSAGES)
            .filter(|q| q.for_all([q.field("channel").eq(channel)]))
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Descending)])
            .offset(keep as u32)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if stale.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = stale.into_iter().map(|entry| entry.id).collect();
        self.batch_delete(collections::FORUM_MESSAGES, &ids).await?;

        tracing::debug!(channel, deleted = ids.len(), "Trimmed forum channel");
        Ok(ids.len())
    }
}
