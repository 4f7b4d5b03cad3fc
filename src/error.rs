use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no city names found in {0}")]
    NoCities(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot render report: {0}")]
    Report(#[from] serde_json::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;
