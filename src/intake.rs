// src/intake.rs

use crate::expense_db::ExpenseStore;
use crate::ocr_extract::OcrClient;
use crate::persist;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Instrument, info, info_span, warn};

/// Watches the waiting area and submits each image for ingestion.
///
/// The watcher itself never writes to storage; it only drives the OCR
/// adapter and the persistence coordinator, one file at a time.
pub struct IntakeWatcher {
    waiting_dir: PathBuf,
    done_dir: PathBuf,
    poll_interval: Duration,
}

impl IntakeWatcher {
    pub fn new(
        waiting_dir: impl Into<PathBuf>,
        done_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            waiting_dir: waiting_dir.into(),
            done_dir: done_dir.into(),
            poll_interval: poll_interval.max(Duration::from_secs(1)),
        }
    }

    /// Poll forever. An unreadable waiting directory or a failed pass is
    /// logged and retried on the next tick; this loop never exits.
    pub async fn run(&self, store: &mut ExpenseStore, ocr: &OcrClient) {
        info!(
            waiting = %self.waiting_dir.display(),
            done = %self.done_dir.display(),
            interval_secs = self.poll_interval.as_secs(),
            "Intake watcher started"
        );
        loop {
            match self.poll(store, ocr).await {
                Ok(0) => {}
                Ok(n) => info!(ingested = n, "Poll pass complete"),
                Err(e) => warn!(error = %e, "Poll pass failed — retrying on next tick"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One pass over the waiting area. Returns how many files reached the
    /// done store. A single file's failure is logged and never blocks the
    /// remaining files.
    pub async fn poll(
        &self,
        store: &mut ExpenseStore,
        ocr: &OcrClient,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let mut ingested = 0;

        for entry in fs::read_dir(&self.waiting_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Unreadable directory entry — skipping");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let span = info_span!("ingest", file = %path.display());
            match self.ingest_one(store, ocr, &path).instrument(span).await {
                Ok(()) => ingested += 1,
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        error = %e,
                        "Ingestion failed — image retained for retry"
                    );
                }
            }
        }

        Ok(ingested)
    }

    /// Ingest a single waiting file: reconcile guard, OCR, commit-and-move.
    async fn ingest_one(
        &self,
        store: &mut ExpenseStore,
        ocr: &OcrClient,
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // A row already referencing this image means a previous attempt
        // committed but could not move the file. Retry the move only; a
        // second extraction would duplicate the invoice.
        if persist::try_reconcile(store, path, &self.done_dir)? {
            return Ok(());
        }

        let image = fs::read(path)?;
        let record = ocr.analyze(&image).await?;

        let (filled, total) = record.coverage();
        info!(
            filled,
            total,
            vendor = %record.vendor_name,
            items = record.items.len(),
            items_subtotal = record.items_subtotal,
            "Extraction result"
        );

        persist::commit_and_move(store, &record, path, &self.done_dir)?;
        Ok(())
    }
}
