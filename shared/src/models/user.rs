//! Roles and the capabilities they grant

use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerError, LedgerResult};

/// Platform role carried in the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Operativo,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operativo => "operativo",
            Role::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "operativo" => Some(Role::Operativo),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Role::Admin => Capabilities {
                can_mutate_stock: true,
                can_view_cost: true,
            },
            Role::Operativo => Capabilities {
                can_mutate_stock: true,
                can_view_cost: false,
            },
            Role::User => Capabilities::default(),
        }
    }
}

/// Explicit permission object passed into every ledger operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_mutate_stock: bool,
    pub can_view_cost: bool,
}

impl Capabilities {
    pub fn require_mutate(&self) -> LedgerResult<()> {
        if self.can_mutate_stock {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied(
                "stock mutation requires an admin or operativo role".to_string(),
            ))
        }
    }
}
