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

//! Roster loading from a CSV export of the fleet spreadsheet.
//!
//! Both the spreadsheet's own column headers and plain English ones are
//! accepted. Columns the roster does not use are ignored.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;
use site_probe::{Roster, SiteRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("cannot open roster {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed roster: {0}")]
    Csv(#[from] csv::Error),
}

/// One spreadsheet row. Missing cells become empty strings.
#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(rename = "SANTRAL ADI", alias = "name", default)]
    name: String,
    #[serde(rename = "STATİK IP", alias = "static_ip", default)]
    static_ip: String,
    #[serde(rename = "ROUTER KULLANICI ADI", alias = "router_user", default)]
    router_user: String,
    #[serde(rename = "ROUTER ŞİFRE", alias = "router_password", default)]
    router_password: String,
    #[serde(rename = "SSH PORT", alias = "ssh_port", default)]
    ssh_port: String,
    #[serde(rename = "ROUTER", alias = "router", default)]
    router_kind: String,
    #[serde(rename = "Modem Erişim", alias = "modem_link", default)]
    modem_link: String,
    #[serde(rename = "Ekk Erişim", alias = "ekk_link", default)]
    ekk_link: String,
}

impl From<RosterRow> for SiteRecord {
    fn from(row: RosterRow) -> Self {
        Self {
            name: row.name,
            static_ip: row.static_ip,
            router_user: row.router_user,
            router_password: row.router_password,
            ssh_port: row.ssh_port,
            router_kind: row.router_kind,
            modem_link: row.modem_link,
            ekk_link: row.ekk_link,
        }
    }
}

/// Load a roster from a CSV file
pub fn load_roster(path: &Path) -> Result<Roster, RosterError> {
    let file = File::open(path).map_err(|source| RosterError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let roster = parse_roster(BufReader::new(file))?;
    info!("Loaded {} sites from {}", roster.len(), path.display());
    Ok(roster)
}

/// Parse roster CSV from any reader
pub fn parse_roster<R: Read>(reader: R) -> Result<Roster, RosterError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut sites = Vec::new();
    for (line, result) in csv_reader.records().enumerate() {
        let mut record = result?;
        // Spreadsheet exports drop trailing empty cells.
        while record.len() < headers.len() {
            record.push_field("");
        }
        let row: RosterRow = record.deserialize(Some(&headers))?;
        if row.name.is_empty() {
            warn!("Skipping roster row {} without a site name", line + 2);
            continue;
        }
        sites.push(SiteRecord::from(row));
    }

    Ok(Roster::new(sites))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_spreadsheet_headers() {
        let csv = "\
SANTRAL ADI,STATİK IP,ROUTER KULLANICI ADI,ROUTER ŞİFRE,SSH PORT,ROUTER,Modem Erişim,Ekk Erişim,İL
Konya GES 1, 10.0.0.1 ,admin,secret,22.0,Four Faith F3436,http://10.0.0.1,http://10.0.0.2,Konya
";
        let roster = parse_roster(csv.as_bytes()).unwrap();
        assert_eq!(roster.len(), 1);
        let site = &roster[0];
        assert_eq!(site.name, "Konya GES 1");
        assert_eq!(site.static_ip, "10.0.0.1");
        assert_eq!(site.router_user, "admin");
        assert_eq!(site.router_password, "secret");
        assert_eq!(site.parse_ssh_port(), Ok(22));
        assert_eq!(site.router_kind, "Four Faith F3436");
        assert_eq!(site.modem_link, "http://10.0.0.1");
        assert_eq!(site.ekk_link, "http://10.0.0.2");
    }

    #[test]
    fn test_english_headers_and_missing_columns() {
        let csv = "name,static_ip,ssh_port\nSite-A,10.0.0.1,22\nSite-B,,abc\n";
        let roster = parse_roster(csv.as_bytes()).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[1].name, "Site-B");
        assert!(!roster[1].has_address());
        assert!(roster[1].parse_ssh_port().is_err());
        assert_eq!(roster[0].router_user, "");
        assert_eq!(roster[0].ekk_link, "");
    }

    #[test]
    fn test_short_rows_and_unnamed_rows() {
        let csv = "name,static_ip,ssh_port\nSite-A\n,10.0.0.9,22\nSite-C,10.0.0.3,22\n";
        let roster = parse_roster(csv.as_bytes()).unwrap();
        let names: Vec<_> = roster.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Site-A", "Site-C"]);
        assert_eq!(roster[0].static_ip, "");
    }

    #[test]
    fn test_trailing_cells_missing_from_sheet_export() {
        let csv = "\
SANTRAL ADI,STATİK IP,ROUTER KULLANICI ADI,ROUTER ŞİFRE,SSH PORT,ROUTER,Modem Erişim,Ekk Erişim
Aksaray GES,10.0.0.7,admin,secret,22
Niğde GES
";
        let roster = parse_roster(csv.as_bytes()).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].parse_ssh_port(), Ok(22));
        assert_eq!(roster[0].router_kind, "");
        assert_eq!(roster[0].ekk_link, "");
        assert_eq!(roster[1].name, "Niğde GES");
        assert!(!roster[1].has_address());
    }

    #[test]
    fn test_load_roster_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,static_ip").unwrap();
        writeln!(file, "Site-A,10.0.0.1").unwrap();
        let roster = load_roster(file.path()).unwrap();
        assert_eq!(roster.find("Site-A").unwrap().static_ip, "10.0.0.1");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_roster(Path::new("/nonexistent/sites.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sites.csv"));
    }
}
