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

//! Text rendering for terminal output.

use site_probe::{Diagnosis, PassSummary, ProbeKind, ProbeOutcome, SiteRecord};

const NAME_WIDTH: usize = 32;

/// Header line for a bulk table.
pub fn table_header(kind: ProbeKind) -> String {
    let column = match kind {
        ProbeKind::Reachability => "PING",
        ProbeKind::Tunnel => "VPN",
    };
    format!("{:>4}  {:<NAME_WIDTH$}  {column}", "#", "SITE")
}

/// One bulk table row. Connection detail is left out to keep the table
/// scannable.
pub fn table_row(index: usize, name: &str, outcome: &ProbeOutcome) -> String {
    format!("{:>4}  {:<NAME_WIDTH$}  {}", index + 1, name, outcome.label())
}

/// Closing line of a bulk pass.
pub fn pass_footer(summary: &PassSummary, successes: usize) -> String {
    if summary.cancelled {
        format!(
            "cancelled after {} of {} sites, {} ok",
            summary.probed, summary.total, successes
        )
    } else {
        format!("all {} probes finished, {} ok", summary.total, successes)
    }
}

/// Full result of a single-site check.
pub fn diagnosis_text(site: &SiteRecord, diagnosis: &Diagnosis) -> String {
    let mut text = format!("{}: {}", site.name, diagnosis.outcome);
    if let Some(transcript) = diagnosis.transcript.as_deref().filter(|t| !t.is_empty()) {
        text.push_str("\n\n");
        text.push_str(transcript);
    }
    text
}

/// Field listing for `show`, with the router password masked.
pub fn site_details(site: &SiteRecord) -> Vec<(&'static str, String)> {
    let password = if site.router_password.is_empty() {
        String::new()
    } else {
        "********".to_string()
    };
    vec![
        ("Name", site.name.clone()),
        ("Static IP", site.static_ip.clone()),
        ("Router user", site.router_user.clone()),
        ("Router password", password),
        ("SSH port", site.ssh_port.clone()),
        ("Router", site.router_kind.clone()),
        ("Modem link", site.modem_link.clone()),
        ("EKK link", site.ekk_link.clone()),
    ]
}
