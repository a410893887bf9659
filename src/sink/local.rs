use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{error, info};

use crate::domain::Patent;
use crate::error::FetcherError;
use crate::sink::{OutputSink, SinkOutcome};

/// Writes each flush as `patents_<timestamp>.json.gz` under `dir`.
#[derive(Debug, Clone)]
pub struct LocalFileSink {
    dir: Utf8PathBuf,
}

impl LocalFileSink {
    pub fn new(dir: Utf8PathBuf) -> Self {
        Self { dir }
    }

    fn next_path(&self) -> Utf8PathBuf {
        let stamp = Local::now().format("%y%m%d_%H%M%S_%6f");
        self.dir.join(format!("patents_{stamp}.json.gz"))
    }
}

impl OutputSink for LocalFileSink {
    fn name(&self) -> &'static str {
        "local"
    }

    fn write(&self, patents: &[Patent]) -> Result<SinkOutcome, FetcherError> {
        let path = self.next_path();
        info!(count = patents.len(), path = %path, "writing patents archive");

        // I/O errors are logged, not returned; the flush reports nothing written.
        match write_archive(&path, patents) {
            Ok(()) => {
                info!(count = patents.len(), path = %path, "patents archive written");
                Ok(SinkOutcome::written(patents.len() as u64)
                    .with_info("output_file", path.as_str()))
            }
            Err(err) => {
                error!(
                    count = patents.len(),
                    path = %path,
                    error = %err,
                    "failed to write patents archive"
                );
                Ok(SinkOutcome::written(0)
                    .with_info("output_file", path.as_str())
                    .with_info("error", err.to_string()))
            }
        }
    }
}

fn write_archive(path: &Utf8Path, patents: &[Patent]) -> std::io::Result<()> {
    let file = File::create(path.as_std_path())?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, patents).map_err(std::io::Error::other)?;
    let mut writer = encoder.finish()?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flate2::read::GzDecoder;

    fn patent(number: &str) -> Patent {
        Patent {
            patent_number: number.to_string(),
            title: "title".to_string(),
            grant_date: NaiveDate::from_ymd_opt(2001, 5, 1).unwrap(),
            abstract_text: "abstract".to_string(),
            claims: vec!["claim".to_string()],
            assignees: vec!["assignee".to_string()],
            inventors: vec!["inventor".to_string()],
            description: "description".to_string(),
        }
    }

    #[test]
    fn writes_gzip_json_array() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let sink = LocalFileSink::new(dir);

        let outcome = sink.write(&[patent("A1"), patent("B2")]).unwrap();
        assert_eq!(outcome.items_written, 2);

        let path = outcome.output_info["output_file"].as_str().unwrap();
        assert!(path.ends_with(".json.gz"));
        let decoder = GzDecoder::new(File::open(path).unwrap());
        let restored: Vec<Patent> = serde_json::from_reader(decoder).unwrap();
        assert_eq!(restored, vec![patent("A1"), patent("B2")]);
    }

    #[test]
    fn missing_directory_reports_zero_written() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("does-not-exist")).unwrap();
        let sink = LocalFileSink::new(dir);

        let outcome = sink.write(&[patent("A1")]).unwrap();
        assert_eq!(outcome.items_written, 0);
        assert!(outcome.output_info.contains_key("error"));
    }
}
