// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod alert;
pub mod broadcast;
pub mod fcm;
pub mod push;

pub use alert::{AlertCoordinator, AlertHandle, ClearOutcome, ClearedBy, RaiseReceipt};
pub use broadcast::{Broadcaster, ServerEvent};
pub use fcm::FcmGateway;
pub use push::{Audience, FanoutReport, PushGateway, PushMessage, PushService};
