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

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use site_probe::ProbeKind;

/// Browse the site roster and check router reachability.
#[derive(Debug, Parser)]
#[command(name = "sitewatch", version, about)]
pub struct Cli {
    /// Roster CSV to use instead of the configured one
    #[arg(long, global = true, value_name = "FILE")]
    pub roster: Option<PathBuf>,

    /// Rendezvous address for tunnel checks, overriding the configured one
    #[arg(long, global = true, value_name = "IP")]
    pub rendezvous: Option<IpAddr>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log probe details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List site names, optionally filtered
    List {
        /// Case-insensitive part of the site name
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show every field of one site
    Show { name: String },
    /// Ping one site's static IP and print the reply
    Ping { name: String },
    /// Check one site's VPN tunnel and print the router's output
    Tunnel { name: String },
    /// Probe every site in the roster
    Bulk {
        #[arg(value_enum)]
        kind: KindArg,
        /// Only probe sites whose name contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Open a site's modem or EKK web interface
    Open {
        name: String,
        #[arg(value_enum)]
        target: LinkTarget,
    },
    /// Inspect or initialise the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Direct ICMP ping
    Ping,
    /// SSH into the router and ping the rendezvous address
    Tunnel,
}

impl From<KindArg> for ProbeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ping => Self::Reachability,
            KindArg::Tunnel => Self::Tunnel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LinkTarget {
    Modem,
    Ekk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file location
    Path,
    /// Print the effective settings
    Show,
    /// Write the effective settings to the configuration file
    Init,
}
