use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ScraperError;
use crate::extract::Record;

/// Append-only CSV output for one task.
///
/// The header is written on creation; every page is flushed as soon as it is
/// written so earlier pages survive a later failure. The file is released
/// when the sink is dropped.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvSink {
    /// Creates (or truncates) `path` and writes the header row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ScraperError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(Record::COLUMNS)?;
        writer.flush()?;
        info!("Opened CSV output: {:?}", path);

        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    /// Appends `records` in order and flushes.
    pub fn write_page(&mut self, records: &[Record]) -> Result<(), ScraperError> {
        for record in records {
            self.writer.serialize(record)?;
        }
        self.writer.flush()?;
        self.rows += records.len();
        debug!("Wrote {} rows ({} total) to {:?}", records.len(), self.rows, self.path);
        Ok(())
    }

    /// Data rows written so far, header excluded.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and releases the file.
    pub fn finish(mut self) -> Result<usize, ScraperError> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}
