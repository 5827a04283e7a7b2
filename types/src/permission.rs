//! Network access levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access level gating which sockets may use a network.
///
/// Levels are ordered: a holder of `System` also satisfies `Network`. The wire encoding is a
/// bitmask in which `System` contains the `Network` bit, so ordering and bit containment agree.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    None,
    Network,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid permission bits {0:#x}")]
pub struct InvalidPermissionBits(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown permission '{0}' (expected none, network or system)")]
pub struct UnknownPermission(pub String);

impl Permission {
    pub const ALL: [Permission; 3] = [Permission::None, Permission::Network, Permission::System];

    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Permission::None => 0x0,
            Permission::Network => 0x1,
            Permission::System => 0x3,
        }
    }

    pub const fn from_bits(bits: u32) -> Result<Self, InvalidPermissionBits> {
        match bits {
            0x0 => Ok(Permission::None),
            0x1 => Ok(Permission::Network),
            0x3 => Ok(Permission::System),
            other => Err(InvalidPermissionBits(other)),
        }
    }

    /// Whether a socket holding `self` may use a network that requires `required`.
    #[must_use]
    pub const fn satisfies(self, required: Permission) -> bool {
        self.bits() & required.bits() == required.bits()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::None => "NONE",
            Permission::Network => "NETWORK",
            Permission::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Permission::None),
            "network" => Ok(Permission::Network),
            "system" => Ok(Permission::System),
            _ => Err(UnknownPermission(s.to_string())),
        }
    }
}
