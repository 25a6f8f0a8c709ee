// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SOS alert lifecycle: raise, authorization of clears, chat record and
//! push fan-out.

use async_trait::async_trait;
use neighbourhood_patrol::config::Config;
use neighbourhood_patrol::db::{DirectoryStore, MemoryStore};
use neighbourhood_patrol::error::AppError;
use neighbourhood_patrol::models::{
    ChatLogEntry, DeviceRegistration, EmergencyAlertEvent, EmergencyCategory, MessageKind,
    Requester, Role, ALERT_CHANNEL,
};
use neighbourhood_patrol::services::{ClearOutcome, ClearedBy, ServerEvent};
use neighbourhood_patrol::AppState;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{create_test_app_with, FakeGateway, GatewayMode, TestApp};

fn fire_at(house: &str, user: &str) -> EmergencyAlertEvent {
    serde_json::from_value(json!({
        "emergencyType": "fire",
        "emergencyTypeLabel": "Fire",
        "emergencyEmoji": "🔥",
        "userId": user,
        "userName": "Ana",
        "houseNumber": house,
        "location": { "lat": 40.41, "lng": -3.70 }
    }))
    .unwrap()
}

async fn register(app: &TestApp, tokens: &[&str]) {
    for token in tokens {
        app.store
            .upsert_registration(&DeviceRegistration {
                token: token.to_string(),
                user_id: format!("owner-{token}"),
                role: Role::Resident,
                updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            })
            .await
            .unwrap();
    }
}

fn user(id: &str) -> Requester {
    Requester::new(Some(id.to_string()), Role::Resident)
}

fn admin(id: &str) -> Requester {
    Requester::new(Some(id.to_string()), Role::Admin)
}

#[tokio::test]
async fn test_owner_denied_admin_scenario() {
    let app = create_test_app_with(GatewayMode::Deliver);
    register(&app, &["tok-a", "tok-b"]).await;
    let mut events = app.state.broadcaster.subscribe();

    let receipt = app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();
    assert_eq!(receipt.alert.raised_by, "u1");
    assert_eq!(receipt.alert.house_label, "12");
    assert_eq!(receipt.alert.category, EmergencyCategory::Fire);

    assert!(matches!(
        events.recv().await.unwrap(),
        ServerEvent::EmergencyAlert(e) if e.user_id == "u1"
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        ServerEvent::ForumMessage(entry) if entry.channel == ALERT_CHANNEL
    ));

    assert!(receipt.log_entry.await.unwrap().is_some());
    let report = receipt.fanout.await.unwrap();
    assert_eq!(report.attempted, 2);
    assert!(report.is_complete_success());

    // Another resident may not clear it.
    let outcome = app.state.alerts.clear(user("u2")).await.unwrap();
    assert_eq!(outcome, ClearOutcome::Denied);
    assert!(events.try_recv().is_err());
    assert!(app.state.alerts.current().await.unwrap().is_some());

    // An admin may.
    let outcome = app.state.alerts.clear(admin("u3")).await.unwrap();
    assert!(matches!(
        outcome,
        ClearOutcome::Cleared { by: ClearedBy::Admin, .. }
    ));
    assert_eq!(events.recv().await.unwrap(), ServerEvent::StopAlert);
    assert!(app.state.alerts.current().await.unwrap().is_none());
}

#[tokio::test]
async fn test_owner_can_clear_own_alert() {
    let app = create_test_app_with(GatewayMode::Deliver);
    app.state.alerts.raise(fire_at("7", "u1")).await.unwrap();

    let outcome = app.state.alerts.clear(user(" u1 ")).await.unwrap();

    assert!(matches!(
        outcome,
        ClearOutcome::Cleared { by: ClearedBy::Owner, ref alert } if alert.house_label == "7"
    ));
    assert!(app.state.alerts.current().await.unwrap().is_none());
}

#[tokio::test]
async fn test_anonymous_clear_is_denied() {
    let app = create_test_app_with(GatewayMode::Deliver);
    app.state.alerts.raise(fire_at("7", "u1")).await.unwrap();

    let outcome = app
        .state
        .alerts
        .clear(Requester::new(None, Role::Resident))
        .await
        .unwrap();

    assert_eq!(outcome, ClearOutcome::Denied);
}

#[tokio::test]
async fn test_last_raise_wins() {
    let app = create_test_app_with(GatewayMode::Deliver);

    app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();
    app.state.alerts.raise(fire_at("30", "u2")).await.unwrap();

    let active = app.state.alerts.current().await.unwrap().unwrap();
    assert_eq!(active.raised_by, "u2");
    assert_eq!(active.house_label, "30");

    // The first raiser no longer owns the alert.
    let outcome = app.state.alerts.clear(user("u1")).await.unwrap();
    assert_eq!(outcome, ClearOutcome::Denied);

    let outcome = app.state.alerts.clear(user("u2")).await.unwrap();
    assert!(matches!(outcome, ClearOutcome::Cleared { .. }));
}

#[tokio::test]
async fn test_clear_while_idle_still_broadcasts() {
    let app = create_test_app_with(GatewayMode::Deliver);
    let mut events = app.state.broadcaster.subscribe();

    let outcome = app.state.alerts.clear(user("anyone")).await.unwrap();

    assert_eq!(outcome, ClearOutcome::NothingActive);
    assert_eq!(events.recv().await.unwrap(), ServerEvent::StopAlert);
}

#[tokio::test]
async fn test_concurrent_clears_resolve_once() {
    let app = create_test_app_with(GatewayMode::Deliver);
    app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let alerts = app.state.alerts.clone();
        tasks.push(tokio::spawn(async move { alerts.clear(user("u1")).await }));
    }

    let mut cleared = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            ClearOutcome::Cleared { .. } => cleared += 1,
            ClearOutcome::NothingActive => {}
            ClearOutcome::Denied => panic!("owner clear must not be denied"),
        }
    }
    assert_eq!(cleared, 1);
}

#[tokio::test]
async fn test_each_raise_records_one_alert_entry() {
    let app = create_test_app_with(GatewayMode::Deliver);

    let first = app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();
    let first_entry = first.log_entry.await.unwrap().unwrap();
    let second = app.state.alerts.raise(fire_at("14", "u2")).await.unwrap();
    second.log_entry.await.unwrap();

    let entries = app.store.chat_entries(ALERT_CHANNEL);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.kind == MessageKind::Alert));
    assert_eq!(entries[0].text, "🚨 FIRE at house #12");
    assert_eq!(entries[0].user, "Ana");
    assert_eq!(first_entry.id, entries[0].id);
}

#[tokio::test]
async fn test_entry_author_falls_back_to_system() {
    let app = create_test_app_with(GatewayMode::Deliver);
    let mut event = fire_at("12", "u1");
    event.user_name = None;

    let receipt = app.state.alerts.raise(event).await.unwrap();
    receipt.log_entry.await.unwrap();

    assert_eq!(app.store.chat_entries(ALERT_CHANNEL)[0].user, "SYSTEM");
}

#[tokio::test]
async fn test_gateway_failure_does_not_block_alert() {
    let app = create_test_app_with(GatewayMode::RejectAll);
    register(&app, &["tok-a", "tok-b"]).await;
    let mut events = app.state.broadcaster.subscribe();

    let receipt = app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();

    assert!(matches!(events.recv().await.unwrap(), ServerEvent::EmergencyAlert(_)));
    assert!(receipt.log_entry.await.unwrap().is_some());
    assert_eq!(app.store.chat_entries(ALERT_CHANNEL).len(), 1);

    let report = receipt.fanout.await.unwrap();
    assert_eq!(report.attempted, 2);
    assert!(report.is_complete_failure());
    assert_eq!(report.stale_tokens.len(), 2);
    // Pruning is off by default.
    assert_eq!(app.store.list_registrations(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_gateway_outage_is_reported_per_token() {
    let app = create_test_app_with(GatewayMode::Unavailable);
    register(&app, &["tok-a", "tok-b", "tok-c"]).await;

    let receipt = app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();
    let report = receipt.fanout.await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.failed(), 3);
    assert!(report.stale_tokens.is_empty());
    assert!(app.state.alerts.current().await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_failure_does_not_block_broadcast() {
    let app = create_test_app_with(GatewayMode::Deliver);
    app.store.set_fail_writes(true);
    let mut events = app.state.broadcaster.subscribe();

    let receipt = app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();

    assert!(receipt.log_entry.await.unwrap().is_none());
    assert!(matches!(events.recv().await.unwrap(), ServerEvent::EmergencyAlert(_)));
    // No chat echo for an entry that was never stored.
    assert!(events.try_recv().is_err());
    assert!(app.state.alerts.current().await.unwrap().is_some());
}

#[tokio::test]
async fn test_sos_push_payload() {
    let app = create_test_app_with(GatewayMode::Deliver);
    register(&app, &["tok-a"]).await;

    let receipt = app.state.alerts.raise(fire_at("12", "u1")).await.unwrap();
    receipt.fanout.await.unwrap();

    let sent = app.gateway.sent();
    assert_eq!(sent.len(), 1);
    let (tokens, message) = &sent[0];
    assert_eq!(tokens, &vec!["tok-a".to_string()]);
    assert_eq!(message.title, "🚨 NEIGHBOURHOOD ALERT");
    assert_eq!(message.body, "Attention! FIRE at house #12. Neighbour: Ana");
    assert_eq!(message.data["type"], "SOS");
    assert_eq!(message.data["houseNumber"], "12");
    assert_eq!(message.tag.as_deref(), Some("sos-alert"));
}

#[tokio::test]
async fn test_invalid_raise_is_rejected() {
    let app = create_test_app_with(GatewayMode::Deliver);
    let mut event = fire_at("12", "u1");
    event.user_id = " ".to_string();

    assert!(app.state.alerts.raise(event).await.is_err());
    assert!(app.state.alerts.current().await.unwrap().is_none());
    assert!(app.store.chat_entries(ALERT_CHANNEL).is_empty());
}

#[tokio::test]
async fn test_unlabelled_house_still_raises() {
    let app = create_test_app_with(GatewayMode::Deliver);
    let event: EmergencyAlertEvent = serde_json::from_value(json!({
        "emergencyType": "medical",
        "userId": "u9",
        "userName": "Luis",
        "houseNumber": null
    }))
    .unwrap();
    let mut events = app.state.broadcaster.subscribe();

    let receipt = app.state.alerts.raise(event).await.unwrap();

    assert_eq!(receipt.alert.house_label, "");
    assert!(matches!(events.recv().await.unwrap(), ServerEvent::EmergencyAlert(_)));
    let entry = receipt.log_entry.await.unwrap().unwrap();
    assert_eq!(entry.text, "🚨 MEDICAL EMERGENCY at an unmarked house");
}

/// Store whose chat writes never complete.
struct StalledChatStore {
    inner: MemoryStore,
}

#[async_trait]
impl DirectoryStore for StalledChatStore {
    async fn upsert_registration(&self, registration: &DeviceRegistration) -> Result<(), AppError> {
        self.inner.upsert_registration(registration).await
    }

    async fn list_registrations(&self, role: Option<Role>) -> Result<Vec<DeviceRegistration>, AppError> {
        self.inner.list_registrations(role).await
    }

    async fn delete_registration(&self, token: &str) -> Result<(), AppError> {
        self.inner.delete_registration(token).await
    }

    async fn append_chat_entry(&self, _entry: &ChatLogEntry) -> Result<(), AppError> {
        std::future::pending().await
    }

    async fn recent_chat_entries(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, AppError> {
        self.inner.recent_chat_entries(channel, limit).await
    }

    async fn trim_channel(&self, channel: &str, keep: usize) -> Result<usize, AppError> {
        self.inner.trim_channel(channel, keep).await
    }
}

#[tokio::test]
async fn test_stalled_chat_write_does_not_block_clear() {
    let store = Arc::new(StalledChatStore {
        inner: MemoryStore::new(),
    });
    let state = AppState::new(
        Config::test_default(),
        store,
        Arc::new(FakeGateway::new(GatewayMode::Deliver)),
    );
    let mut events = state.broadcaster.subscribe();

    let receipt = tokio::time::timeout(Duration::from_secs(2), state.alerts.raise(fire_at("12", "u1")))
        .await
        .expect("raise must not wait for the chat write")
        .unwrap();
    assert!(matches!(events.recv().await.unwrap(), ServerEvent::EmergencyAlert(_)));

    let snapshot = tokio::time::timeout(Duration::from_secs(2), state.alerts.current())
        .await
        .expect("snapshot must not wait for the chat write")
        .unwrap();
    assert!(snapshot.is_some());

    let outcome = tokio::time::timeout(Duration::from_secs(2), state.alerts.clear(admin("u3")))
        .await
        .expect("clear must not wait for the chat write")
        .unwrap();
    assert!(matches!(outcome, ClearOutcome::Cleared { by: ClearedBy::Admin, .. }));
    assert_eq!(events.recv().await.unwrap(), ServerEvent::StopAlert);

    // The chat record is still pending.
    assert!(!receipt.log_entry.is_finished());
    receipt.log_entry.abort();
}
