use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::registry::TagRegistry;

#[derive(Parser, Debug)]
#[command(name = "tagtrade")]
#[command(version)]
#[command(about = "Coordinator for the NFC card trading game", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and the per-environment overrides
    #[arg(short, long, default_value = "config", env = "TAGTRADE_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the game (default)
    Run,
    /// Check the configuration and registry, then exit
    Validate,
    /// Feed a file of scan and control lines through the engine with dry-run settlement
    Replay {
        /// One `SCAN,<id>` line or control key (C, P) per line
        file: PathBuf,
        /// Keep the configured step and settle delays
        #[arg(long)]
        live_delays: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the roster, channel mapping and resource categories
    Roster,
}

/// Human-readable overview of who plays where
pub fn print_roster(config: &AppConfig, registry: &TagRegistry) {
    println!("Players (trade rotation order):");
    for (i, player) in registry.roster().iter().enumerate() {
        let seated: Vec<&str> = config
            .channels
            .iter()
            .filter(|c| c.player_ids().contains(&player.id))
            .map(|c| c.name.as_str())
            .collect();
        let seated = if seated.is_empty() {
            "-".to_string()
        } else {
            seated.join(",")
        };
        println!(
            "  {}. {:<12} {:<6} tag {:<16} reader {}",
            i + 1,
            player.id.as_str(),
            player.label,
            player.tag.as_str(),
            seated
        );
    }

    println!("Resources:");
    for (category, count) in registry.categories() {
        println!("  {:<10} {} tag(s)", category.as_str(), count);
    }

    println!("Readers:");
    if config.channels.is_empty() {
        println!("  (none configured)");
    }
    for channel in &config.channels {
        println!(
            "  {:<10} {}  players [{}]",
            channel.name,
            channel.device.display(),
            channel.players.join(", ")
        );
    }
}
