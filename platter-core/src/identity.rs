use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Customer => "CUSTOMER",
            Role::Vendor => "VENDOR",
            Role::Admin => "ADMIN",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CUSTOMER" | "USER" => Ok(Role::Customer),
            "VENDOR" => Ok(Role::Vendor),
            "ADMIN" => Ok(Role::Admin),
            other => Err(CoreError::IdentityError(format!("unknown role {}", other))),
        }
    }
}

/// Verified caller identity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Turns a bearer credential into an [`Identity`].
///
/// Token issuance lives elsewhere; this side only consumes tokens.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, bearer_token: &str) -> CoreResult<Identity>;
}

pub fn require_role(identity: &Identity, role: Role) -> CoreResult<()> {
    if identity.role == role {
        Ok(())
    } else {
        Err(CoreError::IdentityError(format!(
            "role {} required, caller is {}",
            role, identity.role
        )))
    }
}
