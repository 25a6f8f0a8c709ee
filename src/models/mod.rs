// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod alert;
pub mod forum;
pub mod subscription;
pub mod user;

pub use alert::{ActiveAlert, EmergencyAlertEvent, EmergencyCategory, GeoPoint, StopAlertRequest};
pub use forum::{ChatLogEntry, MessageKind, PostForumRequest, ALERT_CHANNEL};
pub use subscription::{DeviceRegistration, SubscribeRequest};
pub use user::{Requester, Role};
