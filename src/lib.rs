// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Neighbourhood Patrol: alert coordination backend for a neighbourhood
//! safety app.
//!
//! This crate keeps the single active SOS alert, relays real-time events
//! to every connected client over WebSocket, records alerts in the shared
//! chat log and fans out push notifications to registered devices.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::DirectoryStore;
use services::{AlertCoordinator, AlertHandle, Broadcaster, PushService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn DirectoryStore>,
    pub broadcaster: Broadcaster,
    pub push: PushService,
    pub alerts: AlertHandle,
}

impl AppState {
    /// Wire the services together and start the alert coordinator.
    pub fn new(
        config: Config,
        db: Arc<dyn DirectoryStore>,
        gateway: Arc<dyn services::PushGateway>,
    ) -> Self {
        let broadcaster = Broadcaster::default();
        let push = PushService::new(db.clone(), gateway, config.prune_stale_tokens);
        let alerts = AlertCoordinator::spawn(broadcaster.clone(), db.clone(), push.clone());

        Self {
            config,
            db,
            broadcaster,
            push,
            alerts,
        }
    }
}
