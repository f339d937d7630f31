// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Settings are stored in TOML through `confy`. Every field has a serde
//! default so older or hand-trimmed files keep loading.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use site_probe::{DiagnosticsConfig, COUNT_FLAG_ROUTER_MARKER, DEFAULT_RENDEZVOUS_IP};
use thiserror::Error;

const APP_NAME: &str = "sitewatch";
const CONFIG_NAME: &str = "config";

/// Roster file name used when none is configured.
pub const DEFAULT_ROSTER_FILE: &str = "sites.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Confy(#[from] confy::ConfyError),

    #[error("rendezvous address '{0}' is not an IP address")]
    InvalidRendezvous(String),
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// CSV export of the fleet spreadsheet
    #[serde(default = "default_roster_path")]
    pub roster_path: PathBuf,

    /// Address pinged from inside each router during tunnel checks
    #[serde(default = "default_rendezvous_ip")]
    pub rendezvous_ip: String,

    /// Echo requests per direct ping
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long to collect remote ping output
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Router model substring that needs `ping -c5`
    #[serde(default = "default_count_flag_marker")]
    pub count_flag_marker: String,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_roster_path() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ROSTER_FILE)
}

fn default_rendezvous_ip() -> String {
    DEFAULT_RENDEZVOUS_IP.to_string()
}

fn default_ping_count() -> u32 {
    5
}

fn default_ping_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_command_timeout_secs() -> u64 {
    15
}

fn default_count_flag_marker() -> String {
    COUNT_FLAG_ROUTER_MARKER.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            roster_path: default_roster_path(),
            rendezvous_ip: default_rendezvous_ip(),
            ping_count: default_ping_count(),
            ping_timeout_secs: default_ping_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            count_flag_marker: default_count_flag_marker(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform config directory
    pub fn load() -> Result<Self, ConfigError> {
        Ok(confy::load(APP_NAME, CONFIG_NAME)?)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Ok(confy::load_path(path)?)
    }

    /// Save configuration to disk, at `path` or the default location
    pub fn save(&self, path: Option<&Path>) -> Result<(), ConfigError> {
        match path {
            Some(path) => confy::store_path(path, self)?,
            None => confy::store(APP_NAME, CONFIG_NAME, self)?,
        }
        Ok(())
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        Ok(confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?)
    }

    /// Probe settings derived from this configuration.
    pub fn diagnostics_config(&self) -> Result<DiagnosticsConfig, ConfigError> {
        let Ok(rendezvous_ip) = self.rendezvous_ip.trim().parse::<IpAddr>() else {
            return Err(ConfigError::InvalidRendezvous(self.rendezvous_ip.clone()));
        };

        Ok(DiagnosticsConfig {
            rendezvous_ip,
            ping_count: self.ping_count.max(1),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            count_flag_marker: self.count_flag_marker.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_probe_defaults() {
        let config = AppConfig::default().diagnostics_config().unwrap();
        assert_eq!(config, DiagnosticsConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitewatch.toml");
        std::fs::write(&path, "rendezvous_ip = \"10.1.2.3\"\nping_timeout_secs = 2\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.rendezvous_ip, "10.1.2.3");
        assert_eq!(config.ping_timeout_secs, 2);
        assert_eq!(config.ping_count, 5);
        assert_eq!(config.count_flag_marker, "Four Faith");

        let diagnostics = config.diagnostics_config().unwrap();
        assert_eq!(diagnostics.rendezvous_ip, IpAddr::from([10, 1, 2, 3]));
        assert_eq!(diagnostics.ping_timeout, Duration::from_secs(2));
        assert_eq!(diagnostics.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_non_ip_rendezvous() {
        let config = AppConfig {
            rendezvous_ip: "10.34.255.18; reboot".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.diagnostics_config(),
            Err(ConfigError::InvalidRendezvous(_))
        ));
    }
}
