// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Best-effort push fan-out.
//!
//! One logical notification becomes a single multicast call to the
//! [`PushGateway`]. The outcome is accounted per registration in a
//! [`FanoutReport`]; a failed or partial delivery is logged and reported,
//! never surfaced as an error to the caller.

use crate::db::DirectoryStore;
use crate::error::AppError;
use crate::models::{DeviceRegistration, Role};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Delivery hint for the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Urgency {
    #[default]
    Normal,
    /// Wake the device and keep the notification on screen.
    High,
}

/// Notification payload shared by every recipient of one fan-out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// String key/value data delivered alongside the notification
    pub data: BTreeMap<String, String>,
    pub urgency: Urgency,
    /// Notifications with the same tag replace each other on the device
    pub tag: Option<String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn urgent(mut self, tag: &str) -> Self {
        self.urgency = Urgency::High;
        self.tag = Some(tag.to_string());
        self
    }
}

/// Why a single delivery failed, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Gateway error code (e.g. `UNREGISTERED`)
    pub code: String,
    pub message: String,
}

impl DeliveryFailure {
    /// Code used when the whole multicast call failed.
    pub const GATEWAY_UNAVAILABLE: &str = "GATEWAY_UNAVAILABLE";
    /// Code used when the gateway returned fewer outcomes than tokens.
    pub const MISSING_RESULT: &str = "MISSING_RESULT";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the token itself is permanently unusable, making its
    /// registration a candidate for removal.
    pub fn is_stale_token(&self) -> bool {
        match self.code.as_str() {
            "UNREGISTERED" | "INVALID_REGISTRATION_TOKEN" | "NOT_FOUND" => true,
            "INVALID_ARGUMENT" => self.message.to_ascii_lowercase().contains("registration token"),
            _ => false,
        }
    }
}

/// Outcome of one delivery: the gateway's message ID, or the failure.
pub type Delivery = std::result::Result<String, DeliveryFailure>;

/// A push delivery service.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver `message` to every token in one multicast call.
    ///
    /// Returns one outcome per token, in the same order. `Err` means the
    /// call as a whole failed and nothing was delivered.
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<Delivery>, AppError>;
}

/// Who a fan-out targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every registration. Used by SOS alerts and forum posts.
    Everyone,
    /// Only registrations of one role. No route sends role-targeted
    /// notifications yet; the admin-only "new neighbour registered" push
    /// belongs to the registration flow, which lives outside this service.
    Role(Role),
}

impl Audience {
    fn role_filter(self) -> Option<Role> {
        match self {
            Audience::Everyone => None,
            Audience::Role(role) => Some(role),
        }
    }
}

/// A registration the gateway failed to deliver to.
#[derive(Debug, Clone)]
pub struct FailedDelivery {
    pub registration: DeviceRegistration,
    pub failure: DeliveryFailure,
}

/// Result of a fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    /// Registrations a delivery was attempted for.
    pub attempted: usize,
    /// Deliveries the gateway accepted.
    pub succeeded: usize,
    /// Failed deliveries with their reasons.
    pub failures: Vec<FailedDelivery>,
    /// Tokens reported as permanently invalid.
    pub stale_tokens: Vec<String>,
    /// Stale registrations deleted from the store.
    pub pruned: usize,
}

impl FanoutReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if every attempted delivery succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns true if deliveries were attempted and all of them failed.
    pub fn is_complete_failure(&self) -> bool {
        self.succeeded == 0 && !self.failures.is_empty()
    }

    /// Returns true if some deliveries succeeded and some failed.
    pub fn is_partial_failure(&self) -> bool {
        self.succeeded > 0 && !self.failures.is_empty()
    }
}

/// Push fan-out orchestration over the directory store and a gateway.
#[derive(Clone)]
pub struct PushService {
    store: Arc<dyn DirectoryStore>,
    gateway: Arc<dyn PushGateway>,
    prune_stale_tokens: bool,
}

impl PushService {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        gateway: Arc<dyn PushGateway>,
        prune_stale_tokens: bool,
    ) -> Self {
        Self {
            store,
            gateway,
            prune_stale_tokens,
        }
    }

    /// Run a fan-out in a detached task. Dropping the handle does not
    /// cancel it.
    pub fn spawn_notify(&self, audience: Audience, message: PushMessage) -> JoinHandle<FanoutReport> {
        let service = self.clone();
        tokio::spawn(async move { service.notify(audience, &message).await })
    }

    /// Deliver `message` to every registration in `audience`.
    pub async fn notify(&self, audience: Audience, message: &PushMessage) -> FanoutReport {
        let registrations = match self.store.list_registrations(audience.role_filter()).await {
            Ok(registrations) => registrations,
            Err(e) => {
                tracing::error!(error = %e, ?audience, "Failed to load push registrations");
                return FanoutReport::default();
            }
        };

        let registrations: Vec<DeviceRegistration> = registrations
            .into_iter()
            .filter(|r| !r.token.trim().is_empty())
            .collect();

        if registrations.is_empty() {
            tracing::debug!(?audience, title = %message.title, "No push registrations to notify");
            return FanoutReport::default();
        }

        let tokens: Vec<String> = registrations.iter().map(|r| r.token.clone()).collect();
        tracing::info!(
            ?audience,
            recipients = tokens.len(),
            title = %message.title,
            "Sending push multicast"
        );

        let deliveries = match self.gateway.send_multicast(&tokens, message).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                tracing::error!(error = %e, "Push multicast failed");
                let failure = DeliveryFailure::new(DeliveryFailure::GATEWAY_UNAVAILABLE, e.to_string());
                vec![Err(failure); tokens.len()]
            }
        };

        let mut report = self.tally(registrations, deliveries);

        if self.prune_stale_tokens {
            report.pruned = self.prune(&report.stale_tokens).await;
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            stale = report.stale_tokens.len(),
            pruned = report.pruned,
            "Push multicast complete"
        );

        report
    }

    fn tally(
        &self,
        registrations: Vec<DeviceRegistration>,
        deliveries: Vec<Delivery>,
    ) -> FanoutReport {
        let mut report = FanoutReport {
            attempted: registrations.len(),
            ..Default::default()
        };
        let mut deliveries = deliveries.into_iter();

        for registration in registrations {
            let delivery = deliveries.next().unwrap_or_else(|| {
                Err(DeliveryFailure::new(
                    DeliveryFailure::MISSING_RESULT,
                    "gateway returned no outcome for this token",
                ))
            });

            match delivery {
                Ok(message_id) => {
                    tracing::debug!(
                        token = %registration.redacted_token(),
                        message_id = %message_id,
                        "Push delivered"
                    );
                    report.succeeded += 1;
                }
                Err(failure) => {
                    tracing::warn!(
                        token = %registration.redacted_token(),
                        user_id = %registration.user_id,
                        code = %failure.code,
                        error = %failure.message,
                        "Push delivery failed"
                    );
                    if failure.is_stale_token() {
                        tracing::info!(
                            token = %registration.redacted_token(),
                            "Stale push token is a candidate for removal"
                        );
                        report.stale_tokens.push(registration.token.clone());
                    }
                    report.failures.push(FailedDelivery {
                        registration,
                        failure,
                    });
                }
            }
        }

        report
    }

    async fn prune(&self, stale_tokens: &[String]) -> usize {
        let mut pruned = 0;
        for token in stale_tokens {
            match self.store.delete_registration(token).await {
                Ok(()) => pruned += 1,
                Err(e) => tracing::warn!(error = %e, "Failed to remove stale push registration"),
            }
        }
        pruned
    }
}
