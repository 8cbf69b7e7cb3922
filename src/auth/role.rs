//! Staff roles and the permissions each one carries.
//!
//! The mapping is plain data: each role lists its full permission set, so adding
//! a permission to one tier never leaks into another by ordering accident.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Host,
    Server,
    Manager,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ViewGuests,
    CreateGuests,
    EditBasicGuestInfo,
    ViewNotifications,
    LogVisits,
    EditOwnVisits,
    ManageStaff,
    ViewAuditLogs,
    EditAllGuests,
    EditAllVisits,
}

const HOST_PERMISSIONS: &[Permission] = &[
    Permission::ViewGuests,
    Permission::CreateGuests,
    Permission::EditBasicGuestInfo,
    Permission::ViewNotifications,
];

const SERVER_PERMISSIONS: &[Permission] = &[
    Permission::ViewGuests,
    Permission::CreateGuests,
    Permission::EditBasicGuestInfo,
    Permission::ViewNotifications,
    Permission::LogVisits,
    Permission::EditOwnVisits,
];

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::ViewGuests,
    Permission::CreateGuests,
    Permission::EditBasicGuestInfo,
    Permission::ViewNotifications,
    Permission::LogVisits,
    Permission::EditOwnVisits,
    Permission::ManageStaff,
    Permission::ViewAuditLogs,
    Permission::EditAllGuests,
    Permission::EditAllVisits,
];

impl StaffRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "HOST",
            Self::Server => "SERVER",
            Self::Manager => "MANAGER",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Server => "Server",
            Self::Manager => "Manager",
        }
    }

    #[must_use]
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Host => HOST_PERMISSIONS,
            Self::Server => SERVER_PERMISSIONS,
            Self::Manager => MANAGER_PERMISSIONS,
        }
    }

    #[must_use]
    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HOST" => Ok(Self::Host),
            "SERVER" => Ok(Self::Server),
            "MANAGER" => Ok(Self::Manager),
            other => Err(format!("unknown staff role: {other}")),
        }
    }
}
