//! Output renderers for CLI commands.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{CliError, CliResult};

/// Summary printed after writing a payload fixture.
#[derive(Debug, Serialize)]
pub(crate) struct FixtureSummary {
    pub(crate) info_hash: String,
    pub(crate) name: String,
    pub(crate) piece_length: u64,
    pub(crate) pieces: usize,
    pub(crate) total_length: u64,
    pub(crate) trackers: Vec<String>,
    pub(crate) payload: PathBuf,
    pub(crate) descriptor: PathBuf,
}

/// Status line printed when a long-running fixture is up.
#[derive(Debug, Serialize)]
pub(crate) struct FixtureStarted<'a> {
    pub(crate) fixture: &'a str,
    pub(crate) addr: SocketAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) accepting: Option<bool>,
}

pub(crate) fn format_json(value: &impl Serialize) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn render_json(value: &impl Serialize) -> CliResult<()> {
    let text = format_json(value)?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn started_line_omits_absent_fields() -> Result<(), Box<dyn std::error::Error>> {
        let started = FixtureStarted {
            fixture: "origin",
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            kind: None,
            accepting: None,
        };
        let text = format_json(&started).map_err(|err| err.display_message())?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["fixture"], "origin");
        assert_eq!(value["addr"], "127.0.0.1:8080");
        assert!(value.get("kind").is_none());
        Ok(())
    }
}
