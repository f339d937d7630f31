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

//! Direct ICMP reachability check.
//!
//! Echo requests are sent by the platform `ping` binary so the process
//! needs no raw-socket privileges. The reply is classified textually.

use std::io;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

use crate::outcome::{has_ttl_marker, Diagnosis, ProbeOutcome};

/// Text printed by one echo exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    /// Combined stdout and stderr of the exchange.
    pub output: String,
    /// Whether the ping tool reported success through its exit status.
    pub exit_ok: bool,
}

/// Sends ICMP echo requests.
///
/// Implement this to replace the system `ping` binary, e.g. in tests.
#[async_trait]
pub trait EchoTransport: Send + Sync {
    /// Send `count` echo requests to `ip`, giving up after `timeout`.
    async fn echo(&self, ip: IpAddr, count: u32, timeout: Duration) -> io::Result<EchoReply>;
}

/// [`EchoTransport`] backed by the platform `ping` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPing;

#[async_trait]
impl EchoTransport for SystemPing {
    async fn echo(&self, ip: IpAddr, count: u32, timeout: Duration) -> io::Result<EchoReply> {
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };

        let mut command = Command::new("ping");
        command
            .arg(count_flag)
            .arg(count.to_string())
            .arg(ip.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_elapsed| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("ping {ip} timed out after {:.1}s", timeout.as_secs_f64()),
                )
            })??;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(EchoReply {
            output: text,
            exit_ok: output.status.success(),
        })
    }
}

/// ICMP reachability probe for a single address.
#[derive(Clone)]
pub struct ReachabilityProbe {
    transport: Arc<dyn EchoTransport>,
    count: u32,
}

impl std::fmt::Debug for ReachabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReachabilityProbe")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl ReachabilityProbe {
    /// Probe using the system `ping` binary with `count` echo requests.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self::with_transport(Arc::new(SystemPing), count)
    }

    #[must_use]
    pub fn with_transport(transport: Arc<dyn EchoTransport>, count: u32) -> Self {
        Self {
            transport,
            count: count.max(1),
        }
    }

    /// Check whether `ip` answers within `timeout`.
    pub async fn probe(&self, ip: &str, timeout: Duration) -> ProbeOutcome {
        self.diagnose(ip, timeout).await.outcome
    }

    /// Like [`probe`](Self::probe), keeping the ping output.
    pub async fn diagnose(&self, ip: &str, timeout: Duration) -> Diagnosis {
        let ip = ip.trim();
        if ip.is_empty() {
            return Diagnosis::bare(ProbeOutcome::NoAddress);
        }

        let Ok(addr) = ip.parse::<IpAddr>() else {
            warn!("Not probing '{}': not an IP address", ip);
            return Diagnosis {
                outcome: ProbeOutcome::Unreachable,
                transcript: Some(format!("'{ip}' is not an IP address")),
            };
        };

        debug!("Pinging {} ({} requests)", addr, self.count);
        match self.transport.echo(addr, self.count, timeout).await {
            Ok(reply) => {
                let outcome = if reply.exit_ok && has_ttl_marker(&reply.output) {
                    ProbeOutcome::Success
                } else {
                    ProbeOutcome::Unreachable
                };
                Diagnosis {
                    outcome,
                    transcript: Some(reply.output.trim().to_string()),
                }
            }
            Err(e) => {
                warn!("Ping to {} failed: {}", addr, e);
                Diagnosis {
                    outcome: ProbeOutcome::Unreachable,
                    transcript: Some(e.to_string()),
                }
            }
        }
    }
}
