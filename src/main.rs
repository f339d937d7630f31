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

mod cli;
mod commands;
mod config;
mod report;
mod roster;

use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use cli::{Cli, Command, ConfigAction};
use commands::{App, CommandResult};
use config::AppConfig;
use site_probe::ProbeKind;

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

async fn run(cli: Cli) -> CommandResult {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(roster) = cli.roster {
        config.roster_path = roster;
    }
    if let Some(rendezvous) = cli.rendezvous {
        config.rendezvous_ip = rendezvous.to_string();
    }

    let app = App::new(config, cli.config)?;
    match cli.command {
        Command::List { search } => app.list(search.as_deref()),
        Command::Show { name } => app.show(&name),
        Command::Ping { name } => app.check(ProbeKind::Reachability, &name).await,
        Command::Tunnel { name } => app.check(ProbeKind::Tunnel, &name).await,
        Command::Bulk { kind, search } => app.bulk(kind.into(), search.as_deref()).await,
        Command::Open { name, target } => app.open(&name, target),
        Command::Config { action } => match action {
            ConfigAction::Path => app.config_path(),
            ConfigAction::Show => app.config_show(),
            ConfigAction::Init => app.config_init(),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
