// src/persist.rs
//
// Couples one invoice's DB commit with the move of its source image from
// the waiting area to the done store. The commit always lands strictly
// before the rename is attempted, so a crash in between leaves the image
// discoverable in waiting and `try_reconcile` heals it on the next poll.

use crate::expense_db::ExpenseStore;
use crate::invoice::ExtractedInvoice;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Commit a candidate invoice and relocate its source image.
///
/// On a rename failure the committed row is kept (a committed transaction
/// is never compensated); the error is surfaced so the caller leaves the
/// file in waiting, and the next poll retries the move via
/// [`try_reconcile`] instead of re-extracting.
pub fn commit_and_move(
    store: &mut ExpenseStore,
    record: &ExtractedInvoice,
    waiting_path: &Path,
    done_dir: &Path,
) -> Result<i64, Box<dyn std::error::Error>> {
    let image_name = file_name(waiting_path)?;

    let invoice_id = store.insert_invoice(record, image_name)?;

    let done_path = done_dir.join(image_name);
    if let Err(e) = fs::rename(waiting_path, &done_path) {
        warn!(
            invoice_id,
            image = %image_name,
            error = %e,
            "Invoice committed but image move failed — will reconcile on next poll"
        );
        return Err(format!("image move failed after commit for invoice {invoice_id}: {e}").into());
    }

    info!(invoice_id, image = %image_name, "Invoice committed and image moved to done store");
    Ok(invoice_id)
}

/// Heal a committed-but-unmoved image.
///
/// Returns true when an invoice row already references this waiting file's
/// name — the earlier attempt committed but could not rename — and the move
/// has now been retried. The caller must skip extraction in that case, or a
/// second OCR pass would create a duplicate invoice.
pub fn try_reconcile(
    store: &ExpenseStore,
    waiting_path: &Path,
    done_dir: &Path,
) -> Result<bool, Box<dyn std::error::Error>> {
    let image_name = file_name(waiting_path)?;

    let Some(invoice) = store.find_by_image(image_name)? else {
        return Ok(false);
    };

    fs::rename(waiting_path, done_dir.join(image_name))?;
    info!(
        invoice_id = invoice.id,
        image = %image_name,
        "Reconciled committed invoice with unmoved image"
    );
    Ok(true)
}

/// Delete an invoice, its items and its image file from the done store.
///
/// Idempotent: a missing invoice row or an already-absent image file both
/// count as success. Returns whether an invoice row was actually removed.
pub fn remove_invoice(
    store: &mut ExpenseStore,
    done_dir: &Path,
    invoice_id: i64,
) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(image_name) = store.delete_invoice(invoice_id)? else {
        info!(invoice_id, "Delete requested for a missing invoice — nothing to do");
        return Ok(false);
    };

    let image_path = done_dir.join(&image_name);
    match fs::remove_file(&image_path) {
        Ok(()) => info!(invoice_id, image = %image_name, "Image removed from done store"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(invoice_id, image = %image_name, "Image was already absent");
        }
        Err(e) => {
            // Rows are gone; the leftover file only needs manual cleanup.
            warn!(invoice_id, image = %image_name, error = %e, "Failed to remove image");
        }
    }
    Ok(true)
}

fn file_name(path: &Path) -> Result<&str, Box<dyn std::error::Error>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("waiting file has no usable name: {}", path.display()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::ExtractedItem;
    use std::path::PathBuf;

    struct Dirs {
        _root: tempfile::TempDir,
        waiting: PathBuf,
        done: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = tempfile::tempdir().expect("tempdir");
        let waiting = root.path().join("images");
        let done = root.path().join("done");
        fs::create_dir_all(&waiting).unwrap();
        fs::create_dir_all(&done).unwrap();
        Dirs {
            _root: root,
            waiting,
            done,
        }
    }

    fn record() -> ExtractedInvoice {
        ExtractedInvoice {
            vendor_name: "コンビニA".to_string(),
            items_subtotal: 150.0,
            items: vec![ExtractedItem {
                description: "おにぎり".to_string(),
                amount: 150.0,
                currency: "JPY".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_and_move() {
        let d = dirs();
        let mut store = ExpenseStore::new(":memory:").unwrap();
        let path = d.waiting.join("r1.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();

        let id = commit_and_move(&mut store, &record(), &path, &d.done).unwrap();

        assert!(!path.exists());
        assert!(d.done.join("r1.jpg").exists());
        let invoice = store.get_invoice(id).unwrap().unwrap();
        assert_eq!(invoice.image_name, "r1.jpg");
        assert_eq!(store.items_for_invoice(id).unwrap().len(), 1);
    }

    #[test]
    fn test_move_failure_keeps_committed_row() {
        let d = dirs();
        let mut store = ExpenseStore::new(":memory:").unwrap();
        let path = d.waiting.join("r2.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();

        // Rename into a directory that does not exist
        let missing_done = d.done.join("nope");
        let result = commit_and_move(&mut store, &record(), &path, &missing_done);

        assert!(result.is_err());
        assert!(path.exists(), "image must stay in waiting");
        let committed = store.find_by_image("r2.jpg").unwrap();
        assert!(committed.is_some(), "row must survive the failed move");
    }

    #[test]
    fn test_reconcile_retries_move_without_reextraction() {
        let d = dirs();
        let mut store = ExpenseStore::new(":memory:").unwrap();
        let path = d.waiting.join("r3.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();

        let missing_done = d.done.join("nope");
        commit_and_move(&mut store, &record(), &path, &missing_done).unwrap_err();

        // Done store is available again on the next pass
        assert!(try_reconcile(&store, &path, &d.done).unwrap());
        assert!(!path.exists());
        assert!(d.done.join("r3.jpg").exists());
        assert_eq!(store.counts().unwrap().0, 1, "no duplicate invoice");
    }

    #[test]
    fn test_reconcile_ignores_unknown_file() {
        let d = dirs();
        let store = ExpenseStore::new(":memory:").unwrap();
        let path = d.waiting.join("new.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();

        assert!(!try_reconcile(&store, &path, &d.done).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_remove_invoice_idempotent() {
        let d = dirs();
        let mut store = ExpenseStore::new(":memory:").unwrap();
        let path = d.waiting.join("r4.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();
        let id = commit_and_move(&mut store, &record(), &path, &d.done).unwrap();

        assert!(remove_invoice(&mut store, &d.done, id).unwrap());
        assert!(!d.done.join("r4.jpg").exists());
        assert!(store.get_invoice(id).unwrap().is_none());

        // Second delete, and a delete of an id that never existed
        assert!(!remove_invoice(&mut store, &d.done, id).unwrap());
        assert!(!remove_invoice(&mut store, &d.done, 9999).unwrap());
    }

    #[test]
    fn test_remove_invoice_with_missing_image() {
        let d = dirs();
        let mut store = ExpenseStore::new(":memory:").unwrap();
        let path = d.waiting.join("r5.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();
        let id = commit_and_move(&mut store, &record(), &path, &d.done).unwrap();

        fs::remove_file(d.done.join("r5.jpg")).unwrap();
        assert!(remove_invoice(&mut store, &d.done, id).unwrap());
    }
}
