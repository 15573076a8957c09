use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(about = "Harvest every category of a site profile")]
    Run {
        #[arg(short, long, help = "Site profile (TOML)")]
        profile: PathBuf,
        #[arg(short, long, help = "Write records and outcomes as JSON to this file")]
        output: Option<PathBuf>,
        #[arg(
            short,
            long = "category",
            help = "Only run this category (repeatable)"
        )]
        categories: Vec<String>,
        #[arg(long, help = "Maximum pages per category")]
        page_cap: Option<u32>,
        #[arg(long, help = "Keep going when an obstacle cannot be dismissed")]
        continue_on_obstacle_failure: bool,
        #[arg(long, help = "Directory for failure snapshots")]
        diagnostics_dir: Option<PathBuf>,
    },

    #[command(about = "Validate a site profile without launching Chrome")]
    Check {
        #[arg(short, long, help = "Site profile (TOML)")]
        profile: PathBuf,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        subcommand: ConfigCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    #[command(about = "Initialize config file with defaults")]
    Init,

    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Show config file path")]
    Path,
}
