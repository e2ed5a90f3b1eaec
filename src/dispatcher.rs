//! Command dispatcher: routes parsed CLI commands to their handlers.

use chrono::{Local, Utc};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::discovery::{KisClient, KisCredentials};
use crate::error::Result;
use crate::pricing::QuoteClient;
use crate::scraping::{extract_snippet, fetch_page, Snippet};
use crate::snapshot::builder::{build_snapshot, DiscoveryOutcome};

/// Route a parsed command line to its handler
pub async fn dispatch_command(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        Commands::Snapshot {
            output,
            no_discovery,
            json,
        } => {
            let output = output.unwrap_or_else(|| config.output.clone());
            dispatch_snapshot(&config, &output, no_discovery, json).await
        }
        Commands::Snippet {
            url,
            selector,
            output,
        } => {
            let url = url.unwrap_or_else(|| config.snippet.url.clone());
            let selector = selector.unwrap_or_else(|| config.snippet.selector.clone());
            let output = output.unwrap_or_else(|| config.snippet.output.clone());
            dispatch_snippet(&url, &selector, &output).await
        }
    }
}

/// Discovery client when enabled and credentials are present
fn discovery_client(config: &Config, no_discovery: bool) -> Option<KisClient> {
    if no_discovery || !config.discovery.enabled {
        info!("Discovery disabled");
        return None;
    }

    let credentials = match KisCredentials::from_env() {
        Some(c) => c,
        None => {
            info!("No KIS credentials in the environment, skipping discovery");
            return None;
        }
    };

    match KisClient::new(
        &config.discovery.base_url,
        credentials,
        &config.discovery.market,
    ) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Could not set up discovery client: {:#}", e);
            None
        }
    }
}

async fn dispatch_snapshot(
    config: &Config,
    output: &Path,
    no_discovery: bool,
    json_output: bool,
) -> Result<()> {
    let quotes = QuoteClient::from_config(&config.quotes)?;
    let discovery = discovery_client(config, no_discovery);
    info!(
        "Building snapshot for {} instruments via {}",
        config.watchlist.len(),
        quotes.name()
    );

    let report = build_snapshot(
        &quotes,
        discovery.as_ref(),
        &config.watchlist,
        &config.discovery,
        &config.rounding_policy(),
        Local::now().date_naive(),
    )
    .await;

    if let DiscoveryOutcome::Failed(reason) = &report.discovery {
        println!("{} Top dividend discovery skipped: {}", "⚠".yellow().bold(), reason);
    }

    let snapshot = report.snapshot;
    snapshot.write_to(output)?;

    if json_output {
        println!("{}", snapshot.to_json_pretty()?);
    }

    let errors = snapshot.error_count();
    if errors > 0 {
        warn!("{} of {} instruments failed", errors, snapshot.len());
    }

    println!(
        "{} {} updated at {}",
        "✓".green().bold(),
        display_name(output),
        snapshot.updated_at_iso()
    );
    Ok(())
}

async fn dispatch_snippet(url: &str, selector: &str, output: &Path) -> Result<()> {
    let html = fetch_page(url).await?;
    let snippet = Snippet::new(extract_snippet(&html, selector)?, Utc::now());
    snippet.write_to(output)?;

    println!(
        "{} {} updated at {}",
        "✓".green().bold(),
        display_name(output),
        snippet.updated_at
    );
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("data/dividends.json")), "dividends.json");
        assert_eq!(display_name(Path::new("out.json")), "out.json");
    }

    #[test]
    fn test_discovery_respects_switches() {
        let mut config = Config::default();
        assert!(discovery_client(&config, true).is_none());

        config.discovery.enabled = false;
        assert!(discovery_client(&config, false).is_none());
    }
}
