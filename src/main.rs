use clap::Parser;
use tagtrade::app;
use tagtrade::cli::{print_roster, Cli, Commands};
use tagtrade::config::AppConfig;
use tagtrade::logging::{init_logging, init_logging_simple};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_logging(&config.logging);
            info!(config_dir = %cli.config_dir.display(), "Starting tagtrade");
            let snapshot = app::run(config).await?;
            info!(
                used_tags = snapshot.used_tags.len(),
                "Shut down cleanly"
            );
            // The blocking stdin reader would otherwise hold the runtime open
            std::process::exit(0);
        }
        Commands::Validate => {
            init_logging_simple();
            let registry = app::load_validated(&config)?;
            println!(
                "OK: {} players, {} categories, {} readers, settlement {:?}",
                registry.roster().len(),
                registry.categories().len(),
                config.channels.len(),
                config.settlement.mode
            );
        }
        Commands::Replay {
            file,
            live_delays,
            json,
        } => {
            init_logging(&config.logging);
            let summary = app::replay_file(&config, &file, live_delays).await?;
            if json {
                println!("{}", summary.snapshot_json()?);
                return Ok(());
            }
            println!(
                "Replayed {} events ({} unrecognized lines), {} tags burned",
                summary.events,
                summary.skipped,
                summary.snapshot.used_tags.len()
            );
            for tag in &summary.snapshot.used_tags {
                println!("  {}", tag);
            }
        }
        Commands::Roster => {
            init_logging_simple();
            let registry = app::load_validated(&config)?;
            print_roster(&config, &registry);
        }
    }

    Ok(())
}
