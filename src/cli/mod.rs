pub mod commands;
pub mod dispatch;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "listing-harvest")]
#[command(version, about = "Paginated catalog extraction through headless Chrome")]
#[command(
    long_about = "Drives one Chrome session through obstacle dialogs and result pages of the categories in a site profile, and emits the listings as JSON records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: commands::Command,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Run Chrome in headless mode")]
    pub headless: Option<bool>,

    #[arg(long, global = true, help = "Path to Chrome executable")]
    pub chrome_path: Option<PathBuf>,

    #[arg(long, global = true, help = "Navigation timeout in seconds")]
    pub timeout: Option<u64>,
}

/// Parses arguments, builds the layered config and runs the command.
/// Returns the process exit code.
pub async fn run() -> crate::Result<i32> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => crate::config::Config::from_file(path)?,
        None => crate::config::Config::load()?,
    };

    let mut overrides = crate::config::ConfigOverrides {
        headless: cli.headless,
        chrome_path: cli.chrome_path.clone(),
        timeout: cli.timeout,
        ..Default::default()
    };
    if let commands::Command::Run {
        page_cap,
        continue_on_obstacle_failure,
        diagnostics_dir,
        ..
    } = &cli.command
    {
        overrides.page_cap = *page_cap;
        overrides.continue_on_obstacle_failure = continue_on_obstacle_failure.then_some(true);
        overrides.diagnostics_dir = diagnostics_dir.clone();
    }

    let config = config.load_with_overrides(overrides);

    dispatch::dispatch(cli, config).await
}
