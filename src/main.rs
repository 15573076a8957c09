use colored::Colorize;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    let verbose = std::env::args().any(|arg| arg == "--verbose" || arg == "-v");
    init_logging(verbose);

    match listing_harvest::cli::run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            for hint in e.suggestions() {
                eprintln!("  • {}", hint);
            }
            process::exit(e.exit_code());
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        EnvFilter::new("info,listing_harvest=debug,chromiumoxide=info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,listing_harvest=info,chromiumoxide=off"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
