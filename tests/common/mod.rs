// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use neighbourhood_patrol::config::Config;
use neighbourhood_patrol::db::{FirestoreDb, MemoryStore};
use neighbourhood_patrol::error::AppError;
use neighbourhood_patrol::routes::create_router;
use neighbourhood_patrol::services::push::{Delivery, DeliveryFailure, PushGateway, PushMessage};
use neighbourhood_patrol::AppState;
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// How the fake gateway answers.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Every token is delivered.
    Deliver,
    /// Every token is rejected as unregistered.
    RejectAll,
    /// The whole call fails.
    Unavailable,
}

/// Push gateway that records every multicast instead of sending it.
pub struct FakeGateway {
    mode: GatewayMode,
    sent: Mutex<Vec<(Vec<String>, PushMessage)>>,
}

#[allow(dead_code)]
impl FakeGateway {
    pub fn new(mode: GatewayMode) -> Self {
        Self {
            mode,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Multicasts received so far, with their tokens.
    pub fn sent(&self) -> Vec<(Vec<String>, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for FakeGateway {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<Delivery>, AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((tokens.to_vec(), message.clone()));

        match self.mode {
            GatewayMode::Deliver => Ok(tokens
                .iter()
                .enumerate()
                .map(|(i, _)| Ok(format!("projects/test/messages/{i}")))
                .collect()),
            GatewayMode::RejectAll => Ok(tokens
                .iter()
                .map(|_| Err(DeliveryFailure::new("UNREGISTERED", "Requested entity was not found.")))
                .collect()),
            GatewayMode::Unavailable => Err(AppError::PushGateway("gateway down".to_string())),
        }
    }
}

/// Handles to the fakes behind a test app.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
}

/// Create a test app on the memory store with a delivering fake gateway.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let app = create_test_app_with(GatewayMode::Deliver);
    (app.router, app.state)
}

/// Create a test app with the given gateway behaviour.
#[allow(dead_code)]
pub fn create_test_app_with(mode: GatewayMode) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(FakeGateway::new(mode));
    let state = Arc::new(AppState::new(
        Config::test_default(),
        store.clone(),
        gateway.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        gateway,
    }
}
