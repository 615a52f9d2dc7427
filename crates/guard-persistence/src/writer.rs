//! JSON Lines file writer for audit records.
//!
//! Uses JSON Lines format (.jsonl):
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Can be read even if write was interrupted
//!
//! Files rotate daily: `{base_dir}/{prefix}_{YYYY-MM-DD}.jsonl`.

use crate::error::PersistenceResult;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Buffered JSON Lines writer.
///
/// Uses append mode, so restarting never truncates an existing day file.
pub struct JsonLinesWriter<T: Serialize> {
    base_dir: PathBuf,
    prefix: String,
    buffer: Vec<T>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
    _record: PhantomData<fn(T)>,
}

impl<T: Serialize> JsonLinesWriter<T> {
    /// Create a new JSON Lines writer.
    pub fn new(base_dir: impl Into<PathBuf>, prefix: &str, max_buffer_size: usize) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create directory");
        }

        Self {
            base_dir,
            prefix: prefix.to_string(),
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
            _record: PhantomData,
        }
    }

    /// Add a record to the buffer, flushing when the buffer is full.
    pub fn add_record(&mut self, record: T) -> PersistenceResult<()> {
        self.buffer.push(record);

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Number of records waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines writer"
            );
        }
    }

    fn open_writer(&self, date: &str) -> PersistenceResult<ActiveWriter> {
        let path = self.base_dir.join(format!("{}_{}.jsonl", self.prefix, date));

        info!(path = %path.display(), "Opening JSON Lines writer (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        })
    }

    /// Flush buffer to the current day's file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();

        if self
            .active_writer
            .as_ref()
            .is_some_and(|w| w.date != today)
        {
            self.close_active_writer();
        }

        let mut active = match self.active_writer.take() {
            Some(active) => active,
            None => self.open_writer(&today)?,
        };

        let record_count = self.buffer.len();
        let result = Self::write_records(&mut active, &self.buffer);
        self.active_writer = Some(active);
        result?;

        debug!(date = %today, records = record_count, "Flushed records to JSON Lines");

        self.buffer.clear();
        Ok(())
    }

    fn write_records(active: &mut ActiveWriter, records: &[T]) -> PersistenceResult<()> {
        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(active.writer, "{json}")?;
        }
        active.writer.flush()?;
        active.records_written += records.len();
        Ok(())
    }

    /// Close the writer, flushing any pending data.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl<T: Serialize> Drop for JsonLinesWriter<T> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush buffer on drop");
        }
        self.close_active_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize)]
    struct Row {
        id: u32,
        note: String,
    }

    fn row(id: u32) -> Row {
        Row {
            id,
            note: format!("row {id}"),
        }
    }

    fn read_lines(dir: &TempDir) -> Vec<String> {
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().into_string().unwrap();
        assert!(name.starts_with("audit_") && name.ends_with(".jsonl"));

        let file = File::open(entries[0].path()).unwrap();
        BufReader::new(file).lines().map_while(Result::ok).collect()
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path(), "audit", 100);

        for i in 0..5 {
            writer.add_record(row(i)).unwrap();
        }
        writer.close().unwrap();

        let lines = read_lines(&temp_dir);
        assert_eq!(lines.len(), 5);
        let first: Row = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(first.note, "row 0");
    }

    #[test]
    fn test_append_mode_across_writers() {
        let temp_dir = TempDir::new().unwrap();

        for batch in 0..2 {
            let mut writer = JsonLinesWriter::new(temp_dir.path(), "audit", 100);
            for i in 0..3 {
                writer.add_record(row(batch * 3 + i)).unwrap();
            }
            writer.close().unwrap();
        }

        assert_eq!(read_lines(&temp_dir).len(), 6);
    }

    #[test]
    fn test_auto_flush_at_buffer_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path(), "audit", 2);

        writer.add_record(row(1)).unwrap();
        assert_eq!(writer.pending(), 1);
        writer.add_record(row(2)).unwrap();
        assert_eq!(writer.pending(), 0);

        assert_eq!(read_lines(&temp_dir).len(), 2);
    }

    #[test]
    fn test_empty_flush_creates_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer: JsonLinesWriter<Row> = JsonLinesWriter::new(temp_dir.path(), "audit", 10);
        writer.flush().unwrap();

        let count = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(count, 0);
    }
}
