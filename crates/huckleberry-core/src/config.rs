//! Configuration types for the Huckleberry bridge
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuckleberryConfig {
    /// Account credentials
    pub account: AccountConfig,

    /// Vendor backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Optional coordinator settings
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl HuckleberryConfig {
    /// Create a new configuration with default backend and coordinator settings
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: AccountConfig {
                email: email.into(),
                password: password.into(),
            },
            backend: BackendConfig::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }

    /// Set the backend configuration
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Set the coordinator configuration
    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.account.validate()?;
        self.backend.validate()?;
        self.coordinator.validate()?;
        Ok(())
    }
}

/// Account credentials
///
/// `Debug` never prints the password.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    pub password: String,
}

impl AccountConfig {
    /// Validate the account configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.email.trim().is_empty() {
            return Err(crate::Error::config("Account email cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(crate::Error::config("Account password cannot be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Vendor backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process backend, optionally seeded from a JSON file
    Memory {
        /// Path to the seed file
        #[serde(default)]
        seed_file: Option<String>,
    },

    /// Custom backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl BackendConfig {
    /// Validate the backend configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            BackendConfig::Memory { seed_file } => {
                if seed_file.as_ref().is_some_and(|path| path.is_empty()) {
                    return Err(crate::Error::config("Memory backend seed file cannot be empty"));
                }
                Ok(())
            }
            BackendConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom backend factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom backend config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the backend type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            BackendConfig::Memory { .. } => "memory",
            BackendConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory { seed_file: None }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Interval of the fallback refresh (in seconds)
    ///
    /// Listeners are the primary update path; this is the safety net that
    /// also keeps the upstream session alive.
    #[serde(default = "default_fallback_interval_secs")]
    pub fallback_interval_secs: u64,

    /// Capacity of the listener-to-coordinator update channel
    ///
    /// When it is full, callbacks park their update in a per-pair slot
    /// that keeps the newest one. Callbacks never block.
    #[serde(default = "default_update_channel_capacity")]
    pub update_channel_capacity: usize,

    /// Capacity of the lifecycle event channel
    ///
    /// When full, events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl CoordinatorConfig {
    /// Fallback refresh interval as a [`Duration`]
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_secs)
    }

    /// Validate the coordinator configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.fallback_interval_secs == 0 {
            return Err(crate::Error::config("Fallback interval must be > 0"));
        }
        if self.update_channel_capacity == 0 {
            return Err(crate::Error::config("Update channel capacity must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fallback_interval_secs: default_fallback_interval_secs(),
            update_channel_capacity: default_update_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_fallback_interval_secs() -> u64 {
    60
}

fn default_update_channel_capacity() -> usize {
    1024
}

fn default_event_channel_capacity() -> usize {
    1000
}
