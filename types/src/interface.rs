//! Validated network interface names.
//!
//! Holding an [`InterfaceName`] means the name is one the kernel would accept for a link, so
//! collaborators can pass it straight through to netlink without re-checking.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kernel `IFNAMSIZ`, including the trailing NUL.
pub const IFNAMSIZ: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceNameError {
    #[error("interface name must not be empty")]
    Empty,
    #[error("interface name '{name}' is longer than {max} bytes", max = IFNAMSIZ - 1)]
    TooLong { name: String },
    #[error("interface name '{name}' is reserved")]
    Reserved { name: String },
    #[error("interface name '{name}' contains forbidden character {ch:?}")]
    ForbiddenChar { name: String, ch: char },
}

/// # Invariants
///
/// - Non-empty and at most `IFNAMSIZ - 1` bytes
/// - Not `.` or `..`
/// - No `/`, `:` or whitespace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    pub fn new(value: impl Into<String>) -> Result<Self, InterfaceNameError> {
        let value = value.into();
        if value.is_empty() {
            return Err(InterfaceNameError::Empty);
        }
        if value.len() >= IFNAMSIZ {
            return Err(InterfaceNameError::TooLong { name: value });
        }
        if value == "." || value == ".." {
            return Err(InterfaceNameError::Reserved { name: value });
        }
        if let Some(ch) = value
            .chars()
            .find(|c| *c == '/' || *c == ':' || c.is_whitespace())
        {
            return Err(InterfaceNameError::ForbiddenChar { name: value, ch });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = InterfaceNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = InterfaceNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl std::ops::Deref for InterfaceName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
