//! # Roles and Caller Identity
//!
//! The identity assertion handed to every lifecycle operation. How the
//! assertion is obtained (bearer token, session, JWT) is outside this crate.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;

/// User roles of the courier system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates packages and shipments; pays for them; may cancel them.
    ImporterExporter,
    /// Courier assigned to shipments; accepts, rejects, and moves them.
    Supplier,
    /// Operator with access to every shipment.
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImporterExporter => "importer_exporter",
            Self::Supplier => "supplier",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "importer_exporter" => Ok(Self::ImporterExporter),
            "supplier" => Ok(Self::Supplier),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of an operation.
///
/// `user_id` is `None` only for the operator identity injected when
/// authentication is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<UserId>,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role,
        }
    }

    /// Operator identity without a user binding.
    pub fn operator() -> Self {
        Self {
            user_id: None,
            role: Role::SuperAdmin,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// Whether the caller is the given user acting in the given role.
    pub fn is(&self, user: UserId, role: Role) -> bool {
        self.role == role && self.user_id == Some(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::ImporterExporter, Role::Supplier, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_rejected() {
        assert_eq!(
            "courier".parse::<Role>(),
            Err(ValidationError::UnknownRole("courier".into()))
        );
    }

    #[test]
    fn role_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&Role::ImporterExporter).unwrap(),
            "\"importer_exporter\""
        );
    }

    #[test]
    fn caller_is_requires_matching_role_and_user() {
        let caller = Caller::new(UserId(5), Role::Supplier);
        assert!(caller.is(UserId(5), Role::Supplier));
        assert!(!caller.is(UserId(5), Role::ImporterExporter));
        assert!(!caller.is(UserId(6), Role::Supplier));
    }

    #[test]
    fn operator_is_super_admin_without_user() {
        let op = Caller::operator();
        assert!(op.is_super_admin());
        assert!(op.user_id.is_none());
        assert!(!op.is(UserId(1), Role::SuperAdmin));
    }
}
