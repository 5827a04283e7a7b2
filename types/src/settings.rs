//! Resolved manager settings shared across crates.
//!
//! Raw TOML structs (with `Option` fields) stay private in `physnet-config`. The loader resolves
//! them into these types at the parse boundary, so a value here is always usable as-is.

use thiserror::Error;

/// Priority of the synthetic throw route used to flush cached routing decisions. It must sort
/// after every route installed by the system or by IPv6 router advertisements.
pub const DEFAULT_THROW_ROUTE_PRIORITY: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("throw route priority must be greater than zero")]
    ZeroThrowRoutePriority,
    #[error("log filter must not be empty")]
    EmptyLogFilter,
}

/// Whether socket destruction spares loopback sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopbackSockets {
    #[default]
    Spare,
    Destroy,
}

impl LoopbackSockets {
    #[must_use]
    pub const fn excluded(self) -> bool {
        matches!(self, LoopbackSockets::Spare)
    }
}

/// Tunables for a `PhysicalNetwork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    throw_route_priority: u32,
    loopback: LoopbackSockets,
}

impl ManagerSettings {
    pub fn new(throw_route_priority: u32, loopback: LoopbackSockets) -> Result<Self, SettingsError> {
        if throw_route_priority == 0 {
            return Err(SettingsError::ZeroThrowRoutePriority);
        }
        Ok(Self {
            throw_route_priority,
            loopback,
        })
    }

    #[must_use]
    pub const fn throw_route_priority(&self) -> u32 {
        self.throw_route_priority
    }

    #[must_use]
    pub const fn loopback(&self) -> LoopbackSockets {
        self.loopback
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            throw_route_priority: DEFAULT_THROW_ROUTE_PRIORITY,
            loopback: LoopbackSockets::Spare,
        }
    }
}

/// A non-empty `tracing` filter directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter(String);

impl LogFilter {
    pub fn new(directive: impl Into<String>) -> Result<Self, SettingsError> {
        let directive = directive.into();
        if directive.trim().is_empty() {
            return Err(SettingsError::EmptyLogFilter);
        }
        Ok(Self(directive))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self("info".to_string())
    }
}
