//! Output sinks that receive flushed patent buffers.
//!
//! Sinks differ in how they fail. [`LocalFileSink`] logs I/O errors and
//! reports zero items written, while [`SqliteSink`] returns
//! [`FetcherError::Sink`]. The fetcher handles both.

mod local;
mod sqlite;

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Settings;
use crate::domain::Patent;
use crate::error::FetcherError;

pub use local::LocalFileSink;
pub use sqlite::SqliteSink;

/// Result of a single flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkOutcome {
    pub items_written: u64,
    #[serde(default)]
    pub output_info: BTreeMap<String, Value>,
}

impl SinkOutcome {
    pub fn written(items_written: u64) -> Self {
        Self {
            items_written,
            output_info: BTreeMap::new(),
        }
    }

    pub fn with_info(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.output_info.insert(key.to_string(), value.into());
        self
    }
}

pub trait OutputSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn write(&self, patents: &[Patent]) -> Result<SinkOutcome, FetcherError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    None,
    Local,
    Sqlite,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::None => write!(f, "none"),
            OutputKind::Local => write!(f, "local"),
            OutputKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl OutputKind {
    pub fn build(self, settings: &Settings) -> Box<dyn OutputSink> {
        match self {
            OutputKind::None => Box::new(NoopSink),
            OutputKind::Local => Box::new(LocalFileSink::new(settings.output_dir.clone())),
            OutputKind::Sqlite => Box::new(SqliteSink::new(settings.sqlite_db.clone())),
        }
    }
}

/// Counts records without persisting them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl OutputSink for NoopSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn write(&self, patents: &[Patent]) -> Result<SinkOutcome, FetcherError> {
        Ok(SinkOutcome::written(patents.len() as u64))
    }
}
