// src/store.rs

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::invoice::InvoiceRefs;
use crate::processor::ProcessingResult;

pub struct RunStore {
    conn: Connection,
}

#[derive(Debug, Serialize)]
pub struct StoredRun {
    pub id: i64,
    pub started_at: String,
    pub success: bool,
    pub message: String,
    pub emails_processed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoredDownload {
    pub path: String,
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StoredExtraction {
    pub path: String,
    pub invoice_number: Option<String>,
    pub order_number: Option<String>,
    pub method: String,
}

impl RunStore {
    /// Open (or create) the ledger at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                success INTEGER NOT NULL,
                message TEXT NOT NULL,
                emails_processed INTEGER NOT NULL DEFAULT 0,
                error TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                sha256 TEXT,
                size INTEGER,
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS extractions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                invoice_number TEXT,
                order_number TEXT,
                method TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_downloads_run_id ON downloads(run_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_extractions_path ON extractions(path)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Hex SHA-256 of a file's bytes.
    pub fn file_digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Persist a run and one row per downloaded file.
    ///
    /// Files that can no longer be read are still recorded, without digest or size.
    pub fn record_run(&self, result: &ProcessingResult) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (success, message, emails_processed, error)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                result.success(),
                result.message(),
                result.emails_processed() as i64,
                result.error(),
            ],
        )?;
        let run_id = self.conn.last_insert_rowid();

        for path in result.files_downloaded() {
            let (digest, size) = match fs::read(path) {
                Ok(data) => (Some(Self::file_digest(&data)), Some(data.len() as i64)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Downloaded file unreadable");
                    (None, None)
                }
            };
            self.conn.execute(
                "INSERT INTO downloads (run_id, path, sha256, size) VALUES (?1, ?2, ?3, ?4)",
                params![run_id, path.to_string_lossy().into_owned(), digest, size],
            )?;
        }

        info!(
            run_id = run_id,
            success = result.success(),
            files = result.files_downloaded().len(),
            "Run recorded"
        );
        Ok(run_id)
    }

    pub fn latest_run(&self) -> SqliteResult<Option<StoredRun>> {
        self.conn
            .query_row(
                "SELECT id, started_at, success, message, emails_processed, error
                 FROM runs
                 ORDER BY id DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(StoredRun {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        success: row.get(2)?,
                        message: row.get(3)?,
                        emails_processed: row.get(4)?,
                        error: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    pub fn downloads_for_run(&self, run_id: i64) -> SqliteResult<Vec<StoredDownload>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, sha256, size FROM downloads WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(StoredDownload {
                path: row.get(0)?,
                sha256: row.get(1)?,
                size: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    pub fn record_extraction(
        &self,
        path: &Path,
        refs: &InvoiceRefs,
        method: &str,
    ) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO extractions (path, invoice_number, order_number, method)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                path.to_string_lossy().into_owned(),
                refs.invoice_number,
                refs.order_number,
                method,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(id = id, path = %path.display(), method = method, "Extraction stored");
        Ok(id)
    }

    /// Newest first.
    pub fn extractions_for_path(&self, path: &Path) -> SqliteResult<Vec<StoredExtraction>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, invoice_number, order_number, method
             FROM extractions
             WHERE path = ?1
             ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![path.to_string_lossy().into_owned()], |row| {
            Ok(StoredExtraction {
                path: row.get(0)?,
                invoice_number: row.get(1)?,
                order_number: row.get(2)?,
                method: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// (runs, successful runs, downloads, extractions)
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize, usize)> {
        let runs: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;

        let successful: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE success = 1",
            [],
            |row| row.get(0),
        )?;

        let downloads: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))?;

        let extractions: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM extractions", [], |row| row.get(0))?;

        Ok((runs, successful, downloads, extractions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;

    #[test]
    fn test_digest_is_stable() {
        let d1 = RunStore::file_digest(b"%PDF-1.4");
        let d2 = RunStore::file_digest(b"%PDF-1.4");
        let d3 = RunStore::file_digest(b"%PDF-1.5");

        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn test_record_and_read_back_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        fs::write(&file, b"abc").unwrap();
        let gone = dir.path().join("gone.pdf");

        let store = RunStore::new(":memory:").unwrap();
        assert!(store.latest_run().unwrap().is_none());

        let result = ProcessingResult::succeeded("done", vec![file.clone(), gone], 2);
        let run_id = store.record_run(&result).unwrap();

        let run = store.latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert!(run.success);
        assert_eq!(run.emails_processed, 2);

        let downloads = store.downloads_for_run(run_id).unwrap();
        assert_eq!(downloads.len(), 2);
        assert_eq!(downloads[0].size, Some(3));
        assert_eq!(downloads[0].sha256.as_deref(), Some(RunStore::file_digest(b"abc").as_str()));
        assert_eq!(downloads[1].sha256, None);

        assert_eq!(store.get_counts().unwrap(), (1, 1, 2, 0));
    }

    #[test]
    fn test_failed_run_keeps_error() {
        let store = RunStore::new(":memory:").unwrap();
        let err = HarvestError::SourceUnavailable("dns".into());
        store
            .record_run(&ProcessingResult::failed("listing failed", &err, Vec::new(), 0))
            .unwrap();

        let run = store.latest_run().unwrap().unwrap();
        assert!(!run.success);
        assert_eq!(run.error.as_deref(), Some("message source unavailable: dns"));
        assert_eq!(store.get_counts().unwrap(), (1, 0, 0, 0));
    }

    #[test]
    fn test_extractions_newest_first() {
        let store = RunStore::new(":memory:").unwrap();
        let path = Path::new("data/invoice.pdf");
        let first = InvoiceRefs {
            invoice_number: Some("INV-1".into()),
            order_number: None,
        };
        let second = InvoiceRefs {
            invoice_number: Some("INV-1".into()),
            order_number: Some("PO-7".into()),
        };

        store.record_extraction(path, &first, "heuristics").unwrap();
        store.record_extraction(path, &second, "llm").unwrap();

        let rows = store.extractions_for_path(path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].method, "llm");
        assert_eq!(rows[0].order_number.as_deref(), Some("PO-7"));
        assert_eq!(rows[1].order_number, None);
    }
}
