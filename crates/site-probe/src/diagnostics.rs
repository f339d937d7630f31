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

//! Probe configuration and kind dispatch.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::outcome::{Diagnosis, ProbeKind, ProbeOutcome};
use crate::reachability::ReachabilityProbe;
use crate::site::SiteRecord;
use crate::tunnel::{TunnelProbe, COUNT_FLAG_ROUTER_MARKER};

/// Default address pinged from inside routers during tunnel checks.
pub const DEFAULT_RENDEZVOUS_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 34, 255, 18));

/// Settings shared by both probe kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Address pinged from the router to confirm the VPN path.
    pub rendezvous_ip: IpAddr,
    /// Echo requests per direct ping.
    pub ping_count: u32,
    /// Deadline for a direct ping.
    pub ping_timeout: Duration,
    /// Deadline for SSH connect, handshake and login.
    pub connect_timeout: Duration,
    /// Deadline for the remote ping's output.
    pub command_timeout: Duration,
    /// Router kind substring that selects `ping -c5`.
    pub count_flag_marker: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rendezvous_ip: DEFAULT_RENDEZVOUS_IP,
            ping_count: 5,
            ping_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(15),
            count_flag_marker: COUNT_FLAG_ROUTER_MARKER.to_string(),
        }
    }
}

/// Both probes bound to one configuration.
///
/// This is what a bulk pass runs against, and what single-site checks
/// go through.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    reachability: ReachabilityProbe,
    tunnel: TunnelProbe,
    config: DiagnosticsConfig,
}

impl Diagnostics {
    /// Probes backed by the system `ping` binary and libssh2.
    #[must_use]
    pub fn new(config: DiagnosticsConfig) -> Self {
        let reachability = ReachabilityProbe::new(config.ping_count);
        let tunnel = TunnelProbe::new(config.count_flag_marker.clone(), config.command_timeout);
        Self::with_probes(config, reachability, tunnel)
    }

    /// Use caller-supplied probes, e.g. ones built over stub transports.
    #[must_use]
    pub fn with_probes(
        config: DiagnosticsConfig,
        reachability: ReachabilityProbe,
        tunnel: TunnelProbe,
    ) -> Self {
        Self {
            reachability,
            tunnel,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// Run one probe of `kind` against `record`.
    pub async fn probe(&self, kind: ProbeKind, record: &SiteRecord) -> ProbeOutcome {
        match kind {
            ProbeKind::Reachability => {
                self.reachability
                    .probe(&record.static_ip, self.config.ping_timeout)
                    .await
            }
            ProbeKind::Tunnel => {
                self.tunnel
                    .probe(record, self.config.rendezvous_ip, self.config.connect_timeout)
                    .await
            }
        }
    }

    /// Run one probe and keep whatever output the target produced.
    pub async fn diagnose(&self, kind: ProbeKind, record: &SiteRecord) -> Diagnosis {
        match kind {
            ProbeKind::Reachability => {
                self.reachability
                    .diagnose(&record.static_ip, self.config.ping_timeout)
                    .await
            }
            ProbeKind::Tunnel => {
                self.tunnel
                    .diagnose(record, self.config.rendezvous_ip, self.config.connect_timeout)
                    .await
            }
        }
    }
}
