use crate::error::{BenchError, BenchResult};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Times adjacency lookups on a randomly linked graph of cities.
#[derive(Parser, Debug, Clone)]
#[command(name = "citybench", version, about)]
pub struct Config {
    /// Database directory; removed and recreated on every run
    pub db_path: PathBuf,

    /// Newline-delimited file of city names
    pub cities_file: PathBuf,

    /// Number of city nodes to create
    #[arg(long, env = "CITYBENCH_CITIES", default_value_t = 10_000)]
    pub cities: usize,

    /// Divisor of --cities giving how many suffixed copies of each name are made
    #[arg(long, env = "CITYBENCH_UNIQUE", default_value_t = 1_000)]
    pub unique_cities: usize,

    /// Neighbours picked per city
    #[arg(long, env = "CITYBENCH_NEIGHBOURS", default_value_t = 10)]
    pub neighbours: usize,

    /// Number of adjacency measurement runs
    #[arg(long, env = "CITYBENCH_RUNS", default_value_t = 10)]
    pub runs: usize,

    /// Seed for shuffling and neighbour selection
    #[arg(long, env = "CITYBENCH_SEED")]
    pub seed: Option<u64>,

    /// Report format written to stdout
    #[arg(long, env = "CITYBENCH_FORMAT", value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

impl Config {
    pub fn validate(&self) -> BenchResult<()> {
        if self.cities == 0 {
            return Err(BenchError::InvalidConfig(
                "--cities must be at least 1".to_string(),
            ));
        }
        if self.unique_cities == 0 {
            return Err(BenchError::InvalidConfig(
                "--unique-cities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
