use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tech_digest::cli::{Cli, Command};
use tech_digest::report::{render_run, Report};
use tech_digest::{Config, Repository, Result, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return Err(e);
        }
    };

    let repo = Repository::new(&config.db_path).await?;

    match cli.command {
        Command::Serve => {
            let scheduler = Arc::new(Scheduler::from_config(&config, repo)?);
            let handle = scheduler.handle();
            info!(adapters = ?scheduler.adapter_names(), "Scheduler started");

            let runner = tokio::spawn({
                let scheduler = scheduler.clone();
                async move { scheduler.run().await }
            });

            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, stopping scheduler");
            handle.stop();

            if let Err(e) = runner.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        Command::Crawl => {
            let scheduler = Scheduler::from_config(&config, repo)?;
            let report = scheduler.run_once().await;
            println!("{}", render_run(&report));
        }
        Command::Cleanup => {
            let scheduler = Scheduler::from_config(&config, repo)?;
            let report = scheduler.run_cleanup().await?;
            println!(
                "Deleted {} articles and {} statistics rows older than {} days",
                report.articles_deleted, report.statistics_deleted, config.retention_days
            );
        }
        Command::Report { days, limit } => {
            println!("{}", Report::load(&repo, days, limit).await.render());
        }
    }

    Ok(())
}
