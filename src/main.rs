mod bench;
mod cities;
mod config;
mod error;
mod report;
mod stats;
mod store;

use clap::Parser;
use config::{Config, ReportFormat};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr; stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let report = bench::run(&config)?;

    match config.format {
        ReportFormat::Text => print!("{}", report.render_text()),
        ReportFormat::Json => println!("{}", report.render_json()?),
    }
    Ok(())
}
