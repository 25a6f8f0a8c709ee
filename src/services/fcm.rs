// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Cloud Messaging (HTTP v1) push gateway.
//!
//! The v1 API accepts one token per request, so a multicast is issued as
//! concurrent per-token sends under a single access token, with outcomes
//! collected in token order.

use crate::config::Config;
use crate::error::AppError;
use crate::services::push::{Delivery, DeliveryFailure, PushGateway, PushMessage, Urgency};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const MAX_CONCURRENT_SENDS: usize = 50;
const NOTIFICATION_ICON: &str = "/logo_bull.png";

/// Cloud Messaging client.
pub struct FcmGateway {
    http: reqwest::Client,
    send_url: String,
    auth: Option<gcloud_sdk::GoogleAuthTokenGenerator>,
}

impl FcmGateway {
    /// Create a gateway authenticated with the configured service account,
    /// or with application default credentials when none is set.
    pub async fn new(config: &Config) -> Result<Self, AppError> {
        let source = match &config.firebase_service_account {
            Some(json) => gcloud_sdk::TokenSourceType::Json(json.clone()),
            None => gcloud_sdk::TokenSourceType::Default,
        };

        let auth = gcloud_sdk::GoogleAuthTokenGenerator::new(source, vec![FCM_SCOPE.to_string()])
            .await
            .map_err(|e| {
                AppError::PushGateway(format!("Failed to load Cloud Messaging credentials: {}", e))
            })?;

        tracing::info!(project = %config.gcp_project_id, "Cloud Messaging gateway initialized");

        Ok(Self {
            http: reqwest::Client::new(),
            send_url: send_url(&config.gcp_project_id),
            auth: Some(auth),
        })
    }

    /// Create a gateway without credentials. Every multicast fails, which
    /// the fan-out logs and reports.
    pub fn new_offline(project_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            send_url: send_url(project_id),
            auth: None,
        }
    }

    async fn access_token(&self) -> Result<String, AppError> {
        let auth = self.auth.as_ref().ok_or_else(|| {
            AppError::PushGateway("Cloud Messaging credentials not configured".to_string())
        })?;

        let token = auth
            .create_token()
            .await
            .map_err(|e| AppError::PushGateway(format!("Failed to obtain access token: {}", e)))?;

        Ok(token.token.as_sensitive_str().to_string())
    }

    async fn send_one(&self, access_token: &str, body: Value) -> Delivery {
        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryFailure::new("TRANSPORT", e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            let sent: SendResponse = serde_json::from_str(&text)
                .map_err(|e| DeliveryFailure::new("MALFORMED_RESPONSE", e.to_string()))?;
            return Ok(sent.name);
        }

        Err(parse_error(status.as_u16(), &text))
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<Delivery>, AppError> {
        let access_token = self.access_token().await?;
        let access_token = access_token.as_str();

        let bodies: Vec<Value> = tokens
            .iter()
            .map(|token| message_body(token, message))
            .collect();

        let deliveries = stream::iter(bodies)
            .map(|body| self.send_one(access_token, body))
            .buffered(MAX_CONCURRENT_SENDS)
            .collect::<Vec<Delivery>>()
            .await;

        Ok(deliveries)
    }
}

fn send_url(project_id: &str) -> String {
    format!(
        "https://fcm.googleapis.com/v1/projects/{}/messages:send",
        project_id
    )
}

/// Build the v1 `messages:send` body for one token.
fn message_body(token: &str, message: &PushMessage) -> Value {
    let high = message.urgency == Urgency::High;

    let mut webpush_notification = json!({
        "icon": NOTIFICATION_ICON,
        "badge": NOTIFICATION_ICON,
    });
    if high {
        webpush_notification["requireInteraction"] = json!(true);
    }
    if let Some(tag) = &message.tag {
        webpush_notification["tag"] = json!(tag);
    }

    json!({
        "message": {
            "token": token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": message.data,
            "android": {
                "priority": if high { "HIGH" } else { "NORMAL" },
                "notification": { "sound": "default" },
            },
            "webpush": {
                "headers": { "Urgency": if high { "high" } else { "normal" } },
                "notification": webpush_notification,
            },
        }
    })
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    error_code: Option<String>,
}

/// Classify an error response. The Cloud Messaging specific `errorCode`
/// detail is preferred over the generic RPC status.
fn parse_error(http_status: u16, body: &str) -> DeliveryFailure {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope
                .error
                .details
                .iter()
                .find_map(|d| d.error_code.clone())
                .or(envelope.error.status)
                .unwrap_or_else(|| format!("HTTP_{}", http_status));
            DeliveryFailure::new(code, envelope.error.message)
        }
        Err(_) => DeliveryFailure::new(format!("HTTP_{}", http_status), body.to_string()),
    }
}
