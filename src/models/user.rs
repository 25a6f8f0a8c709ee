//! Neighbour roles and the identity claims attached to requests.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Role of a neighbour within the community.
///
/// The web client calls residents `user`; `resident` is accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(rename = "user", alias = "resident")]
    Resident,
}

impl Role {
    /// Stored/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Resident => "user",
        }
    }

    /// Interpret a client-asserted role. Anything other than exactly
    /// `admin` (including a missing role) carries no privileges.
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some("admin") => Role::Admin,
            _ => Role::Resident,
        }
    }
}

/// Who is asking to clear an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Option<String>,
    pub role: Role,
}

impl Requester {
    pub fn new(user_id: Option<String>, role: Role) -> Self {
        let user_id = user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Self { user_id, role }
    }

    /// Whether this requester is the given user. An anonymous requester
    /// never matches anyone.
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

impl From<&crate::models::StopAlertRequest> for Requester {
    fn from(req: &crate::models::StopAlertRequest) -> Self {
        Requester::new(req.user_id.clone(), Role::from_claim(req.role.as_deref()))
    }
}
