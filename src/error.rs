use std::path::PathBuf;

use chrono::NaiveDate;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetcherError {
    #[error("invalid date range: grant_to_date ({to}) must be after grant_from_date ({from})")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("invalid page window: {0}")]
    InvalidPageWindow(String),

    #[error("invalid page count: {0}")]
    InvalidPageCount(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("patent API request failed: {0}")]
    Transport(String),

    #[error("health check failed with status {status:?} (service={service})")]
    #[diagnostic(help("the patent API must report status \"healthy\" before a fetch starts"))]
    HealthCheckFailed { status: String, service: String },

    #[error("output sink failed: {0}")]
    Sink(String),

    #[error("patent fetch failed at page {page}")]
    FetchFailed {
        page: u32,
        #[source]
        source: Box<FetcherError>,
    },
}

impl FetcherError {
    /// Innermost error of a `FetchFailed` chain.
    pub fn root_cause(&self) -> &FetcherError {
        match self {
            FetcherError::FetchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
