use serde::{Deserialize, Serialize};

use crate::error::BoostError;

/// Actor recorded when the engine itself cancels a boost (failed or expired
/// payment).
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    User,
    Admin,
}

/// Authenticated identity on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: CallerRole,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: CallerRole::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: CallerRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == CallerRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), BoostError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BoostError::Authorization(
                "administrator privileges required".to_string(),
            ))
        }
    }

    /// Owners act on their own records; administrators act on any.
    pub fn require_owner_or_admin(&self, owner_id: &str) -> Result<(), BoostError> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(BoostError::Authorization(
                "only the listing owner or an administrator can do this".to_string(),
            ))
        }
    }
}
