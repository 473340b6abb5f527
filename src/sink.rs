//! Batch persistence: flatten raw records and write them as CSV files.

use crate::error::Result;
use crate::flatten::{flatten, FLAT_COLUMNS};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for flushed batches.
pub trait BatchSink {
    /// Persist one batch. `batch_index` starts at 1. Returns rows written.
    fn write_batch(&mut self, batch_index: usize, records: &[Value]) -> Result<usize>;
}

/// Writes `papers_batch_<n>.csv` files into a directory.
#[derive(Debug, Clone)]
pub struct CsvBatchWriter {
    dir: PathBuf,
}

impl CsvBatchWriter {
    /// The directory is created on the first write, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn batch_path(&self, batch_index: usize) -> PathBuf {
        self.dir.join(format!("papers_batch_{}.csv", batch_index))
    }
}

impl BatchSink for CsvBatchWriter {
    fn write_batch(&mut self, batch_index: usize, records: &[Value]) -> Result<usize> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.batch_path(batch_index);

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        wtr.write_record(FLAT_COLUMNS)?;

        let mut rows = 0;
        for record in records.iter().filter(|r| r.is_object()) {
            wtr.serialize(flatten(record))?;
            rows += 1;
        }
        wtr.flush()?;

        let skipped = records.len() - rows;
        if skipped > 0 {
            debug!(skipped, "Skipped non-object records");
        }
        info!(batch = batch_index, rows, path = %path.display(), "Saved batch");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_batch_creates_dir_and_rows() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("nested").join("out");
        let mut writer = CsvBatchWriter::new(&out);
        assert_eq!(writer.dir(), out.as_path());
        assert!(!out.exists());

        let records = vec![
            json!({"id": "W1", "title": "First", "authorships": [{}, {}]}),
            json!("garbage"),
            json!({"id": "W2", "title": "Second, with comma"}),
        ];
        let rows = writer.write_batch(3, &records)?;
        assert_eq!(rows, 2);

        let path = out.join("papers_batch_3.csv");
        let mut rdr = csv::Reader::from_path(&path)?;
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        assert_eq!(headers, FLAT_COLUMNS);

        let rows: Vec<csv::StringRecord> = rdr.records().collect::<std::result::Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "W1");
        assert_eq!(&rows[0][12], "2");
        assert_eq!(&rows[1][2], "Second, with comma");
        Ok(())
    }

    #[test]
    fn test_empty_batch_still_has_header() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut writer = CsvBatchWriter::new(temp.path());
        assert_eq!(writer.write_batch(1, &[])?, 0);

        let content = std::fs::read_to_string(writer.batch_path(1))?;
        assert_eq!(content.trim_end(), FLAT_COLUMNS.join(","));
        Ok(())
    }
}
