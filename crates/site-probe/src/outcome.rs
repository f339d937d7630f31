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

//! Probe result taxonomy.

use std::fmt;

/// Which probe a pass (or a single check) runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Direct ICMP echo to the site's static IP.
    Reachability,
    /// SSH into the router and ping the rendezvous address from inside it.
    Tunnel,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reachability => write!(f, "ping"),
            Self::Tunnel => write!(f, "tunnel"),
        }
    }
}

/// Classified result of probing one site.
///
/// Every failure path maps to one of these variants; none of them is an
/// error from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered.
    Success,
    /// The record has no static IP.
    NoAddress,
    /// The SSH port column does not hold a usable port.
    InvalidPort,
    /// The SSH session could not be established.
    AuthOrConnectError(String),
    /// The router ran the ping but the rendezvous address did not answer.
    NoResponse,
    /// The direct ping got no reply or could not be sent.
    Unreachable,
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Connection detail, shown only when a single site is checked.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::AuthOrConnectError(detail) => Some(detail),
            _ => None,
        }
    }

    /// Short status string for table rows.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::NoAddress => "❌ no IP",
            Self::InvalidPort => "❌ bad port",
            Self::AuthOrConnectError(_) => "❌ error",
            Self::NoResponse => "❌ no response",
            Self::Unreachable => "❌",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthOrConnectError(detail) => write!(f, "{}: {detail}", self.label()),
            _ => f.write_str(self.label()),
        }
    }
}

/// Outcome of a single-site check together with what the target printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub outcome: ProbeOutcome,
    /// Raw ping or remote command output, when any was captured.
    pub transcript: Option<String>,
}

impl Diagnosis {
    /// A diagnosis that produced no output.
    #[must_use]
    pub fn bare(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            transcript: None,
        }
    }
}

/// Whether ping output shows at least one echo reply.
///
/// Both Unix (`ttl=`) and Windows (`TTL=`) spellings are accepted.
#[must_use]
pub fn has_ttl_marker(output: &str) -> bool {
    output.to_ascii_lowercase().contains("ttl=")
}
