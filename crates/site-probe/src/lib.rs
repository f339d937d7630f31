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

//! Reachability diagnostics for a fleet of remote router sites.
//!
//! Two probes are available for every site in a [`Roster`]:
//!
//! - **Reachability**: direct ICMP echo to the site's static IP
//! - **Tunnel**: SSH into the site's router and ping a rendezvous address
//!   from inside it, confirming the VPN path is up
//!
//! Probes never fail from the caller's point of view; every problem is a
//! [`ProbeOutcome`] variant. A [`BulkRunner`] walks a whole roster in the
//! background and streams per-site outcomes in roster order.
//!
//! # Bulk pass
//!
//! ```no_run
//! use std::sync::Arc;
//! use site_probe::{BulkRunner, Diagnostics, DiagnosticsConfig, DiagnosticEvent, ProbeKind, Roster, SiteRecord};
//!
//! #[tokio::main]
//! async fn main() {
//!     let diagnostics = Arc::new(Diagnostics::new(DiagnosticsConfig::default()));
//!     let roster = Roster::new(vec![
//!         SiteRecord::new("Site-A")
//!             .with_static_ip("10.0.0.1")
//!             .with_ssh_port("22")
//!             .with_credentials("admin", "secret"),
//!     ]);
//!
//!     let mut pass = BulkRunner::new(diagnostics).start(roster, ProbeKind::Tunnel);
//!     while let Some(event) = pass.recv().await {
//!         match event {
//!             DiagnosticEvent::Item { index, outcome } => println!("{index}: {outcome}"),
//!             DiagnosticEvent::Completed | DiagnosticEvent::Cancelled => break,
//!         }
//!     }
//! }
//! ```
//!
//! # Single site
//!
//! ```no_run
//! use site_probe::{Diagnostics, DiagnosticsConfig, ProbeKind, SiteRecord};
//!
//! # async fn example() {
//! let diagnostics = Diagnostics::new(DiagnosticsConfig::default());
//! let site = SiteRecord::new("Site-A").with_static_ip("10.0.0.1");
//! let diagnosis = diagnostics.diagnose(ProbeKind::Reachability, &site).await;
//! println!("{}", diagnosis.outcome);
//! if let Some(output) = diagnosis.transcript {
//!     println!("{output}");
//! }
//! # }
//! ```

pub mod diagnostics;
pub mod outcome;
pub mod reachability;
pub mod runner;
pub mod site;
pub mod tunnel;

pub use diagnostics::{Diagnostics, DiagnosticsConfig, DEFAULT_RENDEZVOUS_IP};
pub use outcome::{Diagnosis, ProbeKind, ProbeOutcome};
pub use reachability::{EchoReply, EchoTransport, ReachabilityProbe, SystemPing};
pub use runner::{
    BulkRunner, DiagnosticEvent, Pass, PassObserver, PassSummary, RunnerError, RunnerState,
    StopHandle,
};
pub use site::{PortError, Roster, SiteRecord};
pub use tunnel::{
    RouterLogin, SessionTimeouts, ShellTransport, Ssh2Transport, TunnelError, TunnelProbe,
    COUNT_FLAG_ROUTER_MARKER,
};
