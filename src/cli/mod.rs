use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dividends")]
#[command(version, about = "Dividend yield snapshot builder")]
#[command(
    long_about = "Fetch quotes for a watchlist of stocks and ETFs, optionally add the top dividend payers from a brokerage ranking, and write the result as a JSON snapshot."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the dividend snapshot (default when no command is given)
    Snapshot {
        /// Output file (overrides the configured path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the ranked discovery phase even when credentials are set
        #[arg(long)]
        no_discovery: bool,

        /// Also print the snapshot JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Capture one element of an external page as an HTML snippet
    Snippet {
        /// Page to fetch
        #[arg(long)]
        url: Option<String>,

        /// CSS selector of the element to capture
        #[arg(long)]
        selector: Option<String>,

        /// Output file (overrides the configured path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Snapshot {
            output: None,
            no_discovery: false,
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_command_means_snapshot() {
        let cli = Cli::try_parse_from(["dividends"]).unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(
            cli.command.unwrap_or_default(),
            Commands::Snapshot {
                no_discovery: false,
                ..
            }
        ));
    }

    #[test]
    fn test_snapshot_flags() {
        let cli = Cli::try_parse_from([
            "dividends",
            "--no-color",
            "snapshot",
            "--output",
            "out.json",
            "--no-discovery",
            "--json",
        ])
        .unwrap();
        assert!(cli.no_color);
        match cli.command {
            Some(Commands::Snapshot {
                output,
                no_discovery,
                json,
            }) => {
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert!(no_discovery);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_snippet_flags() {
        let cli = Cli::try_parse_from([
            "dividends",
            "snippet",
            "--selector",
            "#ticker",
            "--config",
            "alt.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Snippet { selector: Some(ref s), url: None, .. }) if s == "#ticker"
        ));
    }
}
