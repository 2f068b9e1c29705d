//! Configuration types
//!
//! Loaded from environment variables with development defaults. Parsing goes
//! through a lookup function so it can be exercised without touching the
//! process environment.

use crate::constants::DEFAULT_OWNER_ID;
use crate::error::ConfigError;
use crate::identity::OwnerId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// What to do when a built-in constraint names a property that does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedFieldPolicy {
    /// Keep the constraint with a zero member id and log a warning.
    #[default]
    Preserve,
    /// Abort the step before anything is written.
    FailFast,
}

impl FromStr for UnresolvedFieldPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preserve" => Ok(Self::Preserve),
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            other => Err(ConfigError::InvalidValue {
                field: "unresolved_field_policy".to_string(),
                value: other.to_string(),
                reason: "expected preserve or fail_fast".to_string(),
            }),
        }
    }
}

/// Settings passed to every upgrade step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Owner recorded on system-seeded records.
    pub owner_id: OwnerId,
    pub unresolved_field_policy: UnresolvedFieldPolicy,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            owner_id: DEFAULT_OWNER_ID.to_string(),
            unresolved_field_policy: UnresolvedFieldPolicy::default(),
        }
    }
}

impl UpgradeConfig {
    /// Create UpgradeConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CMDB_OWNER_ID`: default owner (default: "0")
    /// - `CMDB_UNRESOLVED_FIELD_POLICY`: "preserve" or "fail_fast" (default: preserve)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let owner_id = lookup("CMDB_OWNER_ID").unwrap_or_else(|| DEFAULT_OWNER_ID.to_string());
        let unresolved_field_policy = match lookup("CMDB_UNRESOLVED_FIELD_POLICY") {
            Some(raw) => raw.parse()?,
            None => UnresolvedFieldPolicy::default(),
        };

        let config = Self {
            owner_id,
            unresolved_field_policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "owner_id".to_string(),
                value: self.owner_id.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Location and sizing of the on-disk document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub map_size_mb: usize,
}

impl StoreConfig {
    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CMDB_STORE_PATH`: store directory (required)
    /// - `CMDB_STORE_MAP_SIZE_MB`: LMDB map size (default: 1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("CMDB_STORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "CMDB_STORE_PATH".to_string(),
            })?;

        let map_size_mb = match lookup("CMDB_STORE_MAP_SIZE_MB") {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                field: "CMDB_STORE_MAP_SIZE_MB".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => 1024,
        };

        let config = Self { path, map_size_mb };
        config.map_size_bytes()?;
        Ok(config)
    }

    /// Map size in bytes; zero and sizes past `usize` are rejected.
    pub fn map_size_bytes(&self) -> Result<usize, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "CMDB_STORE_MAP_SIZE_MB".to_string(),
            value: self.map_size_mb.to_string(),
            reason: reason.to_string(),
        };
        if self.map_size_mb == 0 {
            return Err(invalid("must be positive"));
        }
        self.map_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| invalid("too large"))
    }
}
