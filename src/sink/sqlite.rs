use camino::Utf8PathBuf;
use rusqlite::{Connection, params};
use tracing::info;

use crate::domain::Patent;
use crate::error::FetcherError;
use crate::sink::{OutputSink, SinkOutcome};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS patent (data TEXT)";
const INSERT_PATENT: &str = "INSERT INTO patent (data) VALUES (?1)";
const COUNT_PATENTS: &str = "SELECT COUNT(*) FROM patent";

/// Appends one JSON document per patent to the `patent` table.
///
/// A connection is opened per flush and dropped before returning.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    db_path: Utf8PathBuf,
}

impl SqliteSink {
    pub fn new(db_path: Utf8PathBuf) -> Self {
        Self { db_path }
    }

    fn insert(&self, patents: &[Patent]) -> rusqlite::Result<(u64, u64)> {
        let mut conn = Connection::open(self.db_path.as_std_path())?;
        conn.execute_batch(CREATE_TABLE)?;

        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(INSERT_PATENT)?;
            for patent in patents {
                let data = serde_json::to_string(patent)
                    .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
                inserted += stmt.execute(params![data])? as u64;
            }
        }
        let table_rows: i64 = tx.query_row(COUNT_PATENTS, [], |row| row.get(0))?;
        tx.commit()?;

        Ok((inserted, table_rows.max(0) as u64))
    }
}

impl OutputSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(&self, patents: &[Patent]) -> Result<SinkOutcome, FetcherError> {
        info!(count = patents.len(), db = %self.db_path, "writing patents to sqlite");
        let (inserted, table_rows) = self.insert(patents).map_err(|err| {
            FetcherError::Sink(format!(
                "failed to write {} patents to sqlite {}: {err}",
                patents.len(),
                self.db_path
            ))
        })?;
        info!(inserted, table_rows, db = %self.db_path, "patents written to sqlite");

        Ok(SinkOutcome::written(inserted)
            .with_info("database", self.db_path.as_str())
            .with_info("table_rows", table_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn patent(number: &str) -> Patent {
        Patent {
            patent_number: number.to_string(),
            title: "title".to_string(),
            grant_date: NaiveDate::from_ymd_opt(2001, 5, 1).unwrap(),
            abstract_text: "abstract".to_string(),
            claims: Vec::new(),
            assignees: Vec::new(),
            inventors: Vec::new(),
            description: "description".to_string(),
        }
    }

    #[test]
    fn appends_rows_across_flushes() {
        let temp = tempfile::tempdir().unwrap();
        let db = Utf8PathBuf::from_path_buf(temp.path().join("patents.db")).unwrap();
        let sink = SqliteSink::new(db.clone());

        let first = sink.write(&[patent("A1"), patent("B2")]).unwrap();
        assert_eq!(first.items_written, 2);
        let second = sink.write(&[patent("C3")]).unwrap();
        assert_eq!(second.items_written, 1);
        assert_eq!(second.output_info["table_rows"], 3);

        let conn = Connection::open(db.as_std_path()).unwrap();
        let data: String = conn
            .query_row("SELECT data FROM patent LIMIT 1", [], |row| row.get(0))
            .unwrap();
        let restored: Patent = serde_json::from_str(&data).unwrap();
        assert_eq!(restored, patent("A1"));
    }

    #[test]
    fn unopenable_database_fails_loudly() {
        let temp = tempfile::tempdir().unwrap();
        let db = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let sink = SqliteSink::new(db);

        assert_matches!(sink.write(&[patent("A1")]), Err(FetcherError::Sink(_)));
    }
}
