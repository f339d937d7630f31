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

use std::error::Error;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use site_probe::{
    BulkRunner, DiagnosticEvent, Diagnostics, Pass, PassSummary, ProbeKind, Roster, SiteRecord,
};

use crate::cli::LinkTarget;
use crate::config::AppConfig;
use crate::report;
use crate::roster::load_roster;

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Everything a command needs: settings, probes and the roster location.
pub struct App {
    config: AppConfig,
    config_path: Option<PathBuf>,
    diagnostics: Arc<Diagnostics>,
}

impl App {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Result<Self, Box<dyn Error>> {
        let diagnostics = Arc::new(Diagnostics::new(config.diagnostics_config()?));
        Ok(Self {
            config,
            config_path,
            diagnostics,
        })
    }

    fn roster(&self) -> Result<Roster, Box<dyn Error>> {
        Ok(load_roster(&self.config.roster_path)?)
    }

    fn site<'a>(roster: &'a Roster, name: &str) -> Result<&'a SiteRecord, Box<dyn Error>> {
        roster
            .find(name)
            .ok_or_else(|| format!("no site named '{name}' in the roster").into())
    }

    pub fn list(&self, search: Option<&str>) -> CommandResult {
        let roster = self.roster()?;
        let sites = roster.search(search.unwrap_or_default());
        for site in &sites {
            println!("{}", site.name);
        }
        info!("{} of {} sites listed", sites.len(), roster.len());
        Ok(())
    }

    pub fn show(&self, name: &str) -> CommandResult {
        let roster = self.roster()?;
        let site = Self::site(&roster, name)?;
        for (label, value) in report::site_details(site) {
            println!("{label:<16} {value}");
        }
        Ok(())
    }

    /// Single-site check with the full transcript.
    pub async fn check(&self, kind: ProbeKind, name: &str) -> CommandResult {
        let roster = self.roster()?;
        let site = Self::site(&roster, name)?;
        if kind == ProbeKind::Tunnel {
            println!(
                "{}: pinging {} from the router...",
                site.name,
                self.diagnostics.config().rendezvous_ip
            );
        }
        let diagnosis = self.diagnostics.diagnose(kind, site).await;
        println!("{}", report::diagnosis_text(site, &diagnosis));
        Ok(())
    }

    /// Probe the whole (optionally filtered) roster, printing rows as they
    /// arrive. Ctrl-C stops the pass after the site in progress.
    pub async fn bulk(&self, kind: ProbeKind, search: Option<&str>) -> CommandResult {
        let mut roster = self.roster()?;
        if let Some(needle) = search {
            roster = roster.filtered(needle);
        }

        println!("{}", report::table_header(kind));
        let pass = BulkRunner::new(Arc::clone(&self.diagnostics)).start(roster.clone(), kind);
        let (summary, successes) =
            render_pass(pass, &roster, tokio::signal::ctrl_c(), &mut io::stdout()).await?;
        println!("{}", report::pass_footer(&summary, successes));
        Ok(())
    }

    pub fn open(&self, name: &str, target: LinkTarget) -> CommandResult {
        let roster = self.roster()?;
        let site = Self::site(&roster, name)?;
        let (label, link) = match target {
            LinkTarget::Modem => ("modem", site.modem_link.trim()),
            LinkTarget::Ekk => ("EKK", site.ekk_link.trim()),
        };
        if link.is_empty() {
            return Err(format!("'{}' has no {label} link", site.name).into());
        }

        info!("Opening {} link for '{}': {}", label, site.name, link);
        webbrowser::open(link)?;
        Ok(())
    }

    pub fn config_path(&self) -> CommandResult {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => AppConfig::get_config_path()?,
        };
        println!("{}", path.display());
        Ok(())
    }

    pub fn config_show(&self) -> CommandResult {
        let c = &self.config;
        println!("roster_path          {}", c.roster_path.display());
        println!("rendezvous_ip        {}", c.rendezvous_ip);
        println!("ping_count           {}", c.ping_count);
        println!("ping_timeout_secs    {}", c.ping_timeout_secs);
        println!("connect_timeout_secs {}", c.connect_timeout_secs);
        println!("command_timeout_secs {}", c.command_timeout_secs);
        println!("count_flag_marker    {}", c.count_flag_marker);
        Ok(())
    }

    pub fn config_init(&self) -> CommandResult {
        self.config.save(self.config_path.as_deref())?;
        self.config_path()
    }
}

/// Write a table row for every result of `pass` and stop the pass once
/// `interrupt` resolves. Returns the summary and the number of successes.
async fn render_pass<W: Write>(
    mut pass: Pass,
    roster: &Roster,
    interrupt: impl Future<Output = io::Result<()>>,
    out: &mut W,
) -> Result<(PassSummary, usize), Box<dyn Error>> {
    tokio::pin!(interrupt);
    let mut stopping = false;
    let mut successes = 0;

    loop {
        tokio::select! {
            event = pass.recv() => match event {
                Some(DiagnosticEvent::Item { index, outcome }) => {
                    if outcome.is_success() {
                        successes += 1;
                    }
                    writeln!(out, "{}", report::table_row(index, &roster[index].name, &outcome))?;
                }
                Some(DiagnosticEvent::Completed | DiagnosticEvent::Cancelled) | None => break,
            },
            result = &mut interrupt, if !stopping => {
                if let Err(e) = result {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                }
                eprintln!("stopping after the current site...");
                stopping = true;
                pass.stop();
            }
        }
    }

    let summary = pass.join().await?;
    Ok((summary, successes))
}
