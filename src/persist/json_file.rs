//! Append combined books to a JSON array file.
//!
//! Books are buffered and written every `save_every` books (and on flush). Each
//! write reads the existing array, appends, and replaces the file through a
//! temporary sibling so a crash never leaves half an array behind. A file that
//! does not hold a JSON array is started over.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::market_data::router::CycleReport;
use crate::persist::{BookRecord, BookSink, PersistError, PersistResult};

pub struct JsonFileSink {
    path: PathBuf,
    save_every: usize,
    buffer: Vec<serde_json::Value>,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>, save_every: usize) -> Self {
        Self { path: path.into(), save_every: save_every.max(1), buffer: Vec::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    async fn read_existing(&self) -> PersistResult<Vec<serde_json::Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Vec<serde_json::Value>>(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Existing book file is not a JSON array, starting over");
                Ok(Vec::new())
            }
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display(), books = self.buffer.len()))]
    async fn write_out(&mut self) -> PersistResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut records = self.read_existing().await?;
        records.append(&mut self.buffer);

        let body = serde_json::to_vec_pretty(&records)?;
        let tmp = tmp_path(&self.path)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(total = records.len(), "Wrote combined books");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PersistResult<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| PersistError::Other(format!("{} has no file name", path.display())))?;
    let mut tmp = name.to_os_string();
    tmp.push(".tmp");
    Ok(path.with_file_name(tmp))
}

#[async_trait]
impl BookSink for JsonFileSink {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn publish(&mut self, report: &CycleReport) -> PersistResult<()> {
        for book in &report.books {
            let record = BookRecord { cycle: report.cycle, recorded_at: report.started_at, symbol: book.symbol(), book };
            self.buffer.push(serde_json::to_value(&record)?);
        }
        if self.buffer.len() >= self.save_every {
            self.write_out().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> PersistResult<()> {
        self.write_out().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::SymbolId;
    use crate::market_data::combined_book::CombinedBook;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn report(cycle: u64) -> CycleReport {
        CycleReport {
            cycle,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(5),
            books: vec![
                Arc::new(CombinedBook::empty(SymbolId::from("ETH-USDC"), vec![])),
                Arc::new(CombinedBook::empty(SymbolId::from("BTC-USDC"), vec![])),
            ],
        }
    }

    async fn read_array(path: &Path) -> Vec<serde_json::Value> {
        let bytes = tokio::fs::read(path).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_writes_every_nth_book() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        let mut sink = JsonFileSink::new(&path, 3);

        sink.publish(&report(1)).await.unwrap();
        assert!(!path.exists());
        assert_eq!(sink.pending(), 2);

        sink.publish(&report(2)).await.unwrap();
        assert_eq!(sink.pending(), 0);
        let records = read_array(&path).await;
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["cycle"], 1);
        assert_eq!(records[3]["symbol"], "BTC-USDC");
        assert_eq!(records[0]["book"]["no_sources"], true);
    }

    #[tokio::test]
    async fn test_flush_appends_to_existing_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        tokio::fs::write(&path, b"[{\"cycle\": 0}]").await.unwrap();

        let mut sink = JsonFileSink::new(&path, 100);
        sink.publish(&report(7)).await.unwrap();
        sink.flush().await.unwrap();
        let records = read_array(&path).await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["cycle"], 0);
        assert_eq!(records[1]["cycle"], 7);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_started_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let mut sink = JsonFileSink::new(&path, 1);
        sink.publish(&report(1)).await.unwrap();
        assert_eq!(read_array(&path).await.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_without_books_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        let mut sink = JsonFileSink::new(&path, 1);
        sink.flush().await.unwrap();
        assert!(!path.exists());
    }
}
