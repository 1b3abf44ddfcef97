use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Crew role as issued by the authentication layer.
///
/// Seniority is roughly `crew ⊂ engineer-plus ⊂ HOD ⊂ {captain, manager}`,
/// but permissions are never derived from an ordering. Every action carries
/// an explicit allow-list (see [`crate::registry`]), because several of them
/// admit a non-contiguous subset of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Crew,
    Deckhand,
    Steward,
    Engineer,
    Eto,
    ChiefEngineer,
    ChiefOfficer,
    ChiefSteward,
    Purser,
    Captain,
    Manager,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Role::Crew,
        Role::Deckhand,
        Role::Steward,
        Role::Engineer,
        Role::Eto,
        Role::ChiefEngineer,
        Role::ChiefOfficer,
        Role::ChiefSteward,
        Role::Purser,
        Role::Captain,
        Role::Manager,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crew => "crew",
            Self::Deckhand => "deckhand",
            Self::Steward => "steward",
            Self::Engineer => "engineer",
            Self::Eto => "eto",
            Self::ChiefEngineer => "chief_engineer",
            Self::ChiefOfficer => "chief_officer",
            Self::ChiefSteward => "chief_steward",
            Self::Purser => "purser",
            Self::Captain => "captain",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| UnknownRole(raw.to_string()))
    }
}

/// Every role. Used for actions any signed-in crew member may take.
pub const ALL_ROLES: &[Role] = &Role::ALL;

/// Engineering ratings and everyone senior to them.
pub const ENGINEER_PLUS: &[Role] = &[
    Role::Engineer,
    Role::Eto,
    Role::ChiefEngineer,
    Role::ChiefOfficer,
    Role::ChiefSteward,
    Role::Purser,
    Role::Captain,
    Role::Manager,
];

/// Heads of department plus command.
pub const HOD_PLUS: &[Role] = &[
    Role::ChiefEngineer,
    Role::ChiefOfficer,
    Role::ChiefSteward,
    Role::Purser,
    Role::Captain,
    Role::Manager,
];

pub const COMMAND: &[Role] = &[Role::Captain, Role::Manager];

/// Work orders are assigned by the technical and deck heads, never by the
/// interior HODs.
pub const WORK_ORDER_ASSIGNERS: &[Role] = &[
    Role::ChiefEngineer,
    Role::ChiefOfficer,
    Role::Captain,
    Role::Manager,
];

pub const HANDOVER_EXPORTERS: &[Role] = &[Role::ChiefEngineer, Role::Captain, Role::Manager];

/// Receiving is signed off by whoever holds the budget: engineering, interior
/// and the purser. The chief officer is not included.
pub const RECEIVING_APPROVERS: &[Role] = &[
    Role::ChiefEngineer,
    Role::ChiefSteward,
    Role::Purser,
    Role::Captain,
    Role::Manager,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names_and_common_spellings() {
        assert_eq!("chief_engineer".parse::<Role>(), Ok(Role::ChiefEngineer));
        assert_eq!("Chief Engineer".parse::<Role>(), Ok(Role::ChiefEngineer));
        assert_eq!("ETO".parse::<Role>(), Ok(Role::Eto));
        assert!("bosun".parse::<Role>().is_err());
    }

    #[test]
    fn tiers_nest() {
        for role in COMMAND {
            assert!(HOD_PLUS.contains(role));
        }
        for role in HOD_PLUS {
            assert!(ENGINEER_PLUS.contains(role));
        }
        for role in ENGINEER_PLUS {
            assert!(ALL_ROLES.contains(role));
        }
    }

    #[test]
    fn assigners_are_not_a_tier() {
        assert!(!WORK_ORDER_ASSIGNERS.contains(&Role::ChiefSteward));
        assert!(HOD_PLUS.contains(&Role::ChiefSteward));
        assert!(!RECEIVING_APPROVERS.contains(&Role::ChiefOfficer));
    }
}
