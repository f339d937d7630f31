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

//! Fleet data model.
//!
//! A [`Roster`] is an immutable, cheaply cloneable snapshot of site records.
//! Bulk passes hold their own clone, so a caller that wants fresher data
//! builds a new roster rather than mutating the one a pass is reading.

use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while interpreting the textual SSH port column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("ssh port is empty")]
    Empty,

    #[error("ssh port is not a number: {0}")]
    NotNumeric(String),

    #[error("ssh port out of range: {0}")]
    OutOfRange(String),
}

/// One entry of the fleet roster.
///
/// All fields are kept as the text the roster source provided; an empty
/// string means the value is missing. Validation happens when a probe
/// needs the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteRecord {
    /// Display name and lookup key.
    pub name: String,
    /// Static IP of the site's router, or empty.
    pub static_ip: String,
    /// Router SSH username.
    pub router_user: String,
    /// Router SSH password.
    pub router_password: String,
    /// SSH port as written in the roster (e.g. "22" or "22.0").
    pub ssh_port: String,
    /// Free-text router model, used to pick the ping dialect.
    pub router_kind: String,
    /// Modem web interface link.
    pub modem_link: String,
    /// EKK web interface link.
    pub ekk_link: String,
}

impl SiteRecord {
    /// Create a record with only a name; the remaining fields are empty.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style setter for the static IP.
    #[must_use]
    pub fn with_static_ip(mut self, ip: impl Into<String>) -> Self {
        self.static_ip = ip.into();
        self
    }

    /// Builder-style setter for router credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.router_user = user.into();
        self.router_password = password.into();
        self
    }

    /// Builder-style setter for the SSH port text.
    #[must_use]
    pub fn with_ssh_port(mut self, port: impl Into<String>) -> Self {
        self.ssh_port = port.into();
        self
    }

    /// Builder-style setter for the router model.
    #[must_use]
    pub fn with_router_kind(mut self, kind: impl Into<String>) -> Self {
        self.router_kind = kind.into();
        self
    }

    /// Whether the record carries an address to probe.
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.static_ip.trim().is_empty()
    }

    /// Parse the SSH port column.
    ///
    /// Spreadsheet exports often render integers as floats, so `"22.0"` is
    /// accepted. Zero, fractions and values above 65535 are rejected.
    pub fn parse_ssh_port(&self) -> Result<u16, PortError> {
        parse_port(&self.ssh_port)
    }
}

fn parse_port(raw: &str) -> Result<u16, PortError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(PortError::Empty);
    }

    if let Ok(port) = text.parse::<u32>() {
        return match u16::try_from(port) {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(PortError::OutOfRange(text.to_string())),
        };
    }

    let value: f64 = text
        .parse()
        .map_err(|_err| PortError::NotNumeric(text.to_string()))?;
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(PortError::NotNumeric(text.to_string()));
    }
    if value < 1.0 || value > f64::from(u16::MAX) {
        return Err(PortError::OutOfRange(text.to_string()));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "range checked above")]
    let port = value as u16;
    Ok(port)
}

/// Ordered, read-only snapshot of site records.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    sites: Arc<[SiteRecord]>,
}

impl Roster {
    /// Build a roster from records in display order.
    #[must_use]
    pub fn new(sites: Vec<SiteRecord>) -> Self {
        Self {
            sites: sites.into(),
        }
    }

    /// Find a site by exact name. Duplicates resolve to the first match.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SiteRecord> {
        self.sites.iter().find(|site| site.name == name)
    }

    /// Case-insensitive substring search over names, in roster order.
    #[must_use]
    pub fn search(&self, needle: &str) -> Vec<&SiteRecord> {
        let needle = needle.to_lowercase();
        self.sites
            .iter()
            .filter(|site| site.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// A new roster holding only the sites matching `needle`.
    #[must_use]
    pub fn filtered(&self, needle: &str) -> Self {
        Self::new(self.search(needle).into_iter().cloned().collect())
    }
}

impl Deref for Roster {
    type Target = [SiteRecord];

    fn deref(&self) -> &Self::Target {
        &self.sites
    }
}

impl From<Vec<SiteRecord>> for Roster {
    fn from(sites: Vec<SiteRecord>) -> Self {
        Self::new(sites)
    }
}

impl FromIterator<SiteRecord> for Roster {
    fn from_iter<I: IntoIterator<Item = SiteRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
