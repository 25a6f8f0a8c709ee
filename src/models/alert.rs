// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SOS alert model: the wire events exchanged over the real-time channel
//! and the in-memory active alert they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError};

/// Kind of emergency being reported.
///
/// Serialized with the identifiers the web client uses; the long
/// descriptive forms are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "kebab-case")]
pub enum EmergencyCategory {
    Fire,
    Flood,
    Robbery,
    Occupation,
    Medical,
    #[serde(rename = "collapse", alias = "structural-collapse")]
    StructuralCollapse,
    Explosion,
    Smoke,
    #[serde(rename = "suspicious", alias = "suspicious-activity")]
    SuspiciousActivity,
    Violence,
    Other,
}

impl EmergencyCategory {
    /// Human-readable name, used when the client sends no label.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Fire => "Fire",
            Self::Flood => "Flood",
            Self::Robbery => "Robbery",
            Self::Occupation => "Occupation",
            Self::Medical => "Medical emergency",
            Self::StructuralCollapse => "Structural collapse",
            Self::Explosion => "Explosion",
            Self::Smoke => "Smoke",
            Self::SuspiciousActivity => "Suspicious activity",
            Self::Violence => "Violence",
            Self::Other => "Other emergency",
        }
    }
}

/// Geographic coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GeoPoint {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

/// `emergency_alert` payload.
///
/// Received from the raising client and, once validated, re-broadcast
/// verbatim to every connected session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlertEvent {
    pub emergency_type: EmergencyCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 64))]
    pub emergency_type_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 16))]
    pub emergency_emoji: Option<String>,
    #[validate(length(min = 1, max = 128), custom(function = "not_blank"))]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub user_name: Option<String>,
    /// Map label of the raiser's house. Empty when the neighbour has none.
    #[serde(default, deserialize_with = "string_or_number")]
    #[validate(length(max = 32))]
    pub house_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub location: Option<GeoPoint>,
}

impl EmergencyAlertEvent {
    /// Label shown in chat and push copy, upper-cased.
    pub fn headline_label(&self) -> String {
        self.emergency_type_label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.emergency_type.display_name())
            .to_uppercase()
    }
}

/// `stop_alert` payload sent by a client asking to clear the alert.
///
/// Both fields are claims made by the client; nothing here is trusted
/// beyond being compared against the stored alert owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct StopAlertRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// The single current emergency, held only in memory by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub raised_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raised_by_name: Option<String>,
    pub house_label: String,
    pub category: EmergencyCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub started_at: DateTime<Utc>,
}

impl ActiveAlert {
    pub fn from_event(event: &EmergencyAlertEvent, started_at: DateTime<Utc>) -> Self {
        Self {
            raised_by: event.user_id.trim().to_string(),
            raised_by_name: event.user_name.clone(),
            house_label: event.house_number.trim().to_string(),
            category: event.emergency_type,
            location: event.location,
            started_at,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Map labels are free text but some clients send them as JSON numbers,
/// or as `null` when the neighbour has no label.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Label>::deserialize(deserializer)? {
        Some(Label::Text(s)) => s,
        Some(Label::Number(n)) => n.to_string(),
        None => String::new(),
    })
}
