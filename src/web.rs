#![cfg(not(tarpaulin_include))]

use clap::Parser;
use survey::app;
use survey::config::Config;

/// Main entry point for the web application
///
/// Reads configuration from flags and environment variables (see
/// `website --help`), sets up logging and serves until stopped.
///
/// # Logging
/// * Defaults to `info`; override with `RUST_LOG`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    app::run(config).await
}
