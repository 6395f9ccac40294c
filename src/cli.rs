//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Crawl keyword-matching technology articles, store them and write a daily
/// digest.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the daily crawl and cleanup schedule until interrupted
    Serve,

    /// Run one crawl now and print its digest
    Crawl,

    /// Delete articles and statistics older than the retention window
    Cleanup,

    /// Print stored articles, keywords and statistics
    Report {
        /// How many days back to look
        #[arg(short, long, default_value_t = 7)]
        days: u32,

        /// Maximum number of articles and keywords to list
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_defaults() {
        let cli = Cli::parse_from(["tech-digest", "report"]);
        assert_eq!(cli.command, Command::Report { days: 7, limit: 20 });
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn global_flags_and_report_options() {
        let cli = Cli::parse_from([
            "tech-digest",
            "--config",
            "/tmp/td.toml",
            "-v",
            "report",
            "--days",
            "30",
            "-l",
            "5",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/td.toml")));
        assert!(cli.verbose);
        assert_eq!(cli.command, Command::Report { days: 30, limit: 5 });
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["tech-digest"]).is_err());
        assert_eq!(Cli::parse_from(["tech-digest", "serve"]).command, Command::Serve);
    }
}
