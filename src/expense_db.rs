// src/expense_db.rs

use crate::invoice::ExtractedInvoice;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use std::path::Path;
use tracing::info;

pub struct ExpenseStore {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct StoredInvoice {
    pub id: i64,
    pub vendor_name: String,
    pub vendor_recipient: String,
    pub vendor_address: String,
    pub invoice_date: Option<String>,
    pub invoice_number: String,
    pub items_subtotal: f64,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    /// Filename in the done store. Locked after ingestion.
    pub image_name: String,
}

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub id: i64,
    pub invoice_id: i64,
    pub description: String,
    pub amount: f64,
    pub currency: String,
}

/// User-editable invoice fields. `id`, `items_subtotal` and `image_name`
/// are system-derived and cannot be edited.
#[derive(Debug, Clone, Default)]
pub struct InvoiceEdit {
    pub vendor_name: String,
    pub vendor_recipient: String,
    pub vendor_address: String,
    pub invoice_date: Option<String>,
    pub invoice_number: String,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

const INVOICE_COLUMNS: &str = "id, vendor_name, vendor_recipient, vendor_address, invoice_date, \
     invoice_number, items_subtotal, subtotal, tax, total, image_name";

impl ExpenseStore {
    /// Open (or create) the expense store with a SQLite backend.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vendor_name TEXT NOT NULL DEFAULT '',
                vendor_recipient TEXT NOT NULL DEFAULT '',
                vendor_address TEXT NOT NULL DEFAULT '',
                invoice_date TEXT,
                invoice_number TEXT NOT NULL DEFAULT '',
                items_subtotal REAL NOT NULL DEFAULT 0,
                subtotal REAL,
                tax REAL,
                total REAL,
                image_name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL DEFAULT 0,
                currency TEXT NOT NULL DEFAULT 'JPY',
                FOREIGN KEY (invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_invoice_id ON items(invoice_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_date ON invoices(invoice_date)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_vendor ON invoices(vendor_name)",
            [],
        )?;

        // Backs the reconciliation lookup on poll.
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_image ON invoices(image_name)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Insert an invoice and all of its items as a single transaction.
    ///
    /// Either the invoice row and every item row land together, or nothing
    /// is written.
    pub fn insert_invoice(
        &mut self,
        record: &ExtractedInvoice,
        image_name: &str,
    ) -> SqliteResult<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO invoices
                (vendor_name, vendor_recipient, vendor_address, invoice_date,
                 invoice_number, items_subtotal, subtotal, tax, total, image_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.vendor_name,
                record.vendor_recipient,
                record.vendor_address,
                record.invoice_date,
                record.invoice_number,
                record.items_subtotal,
                record.subtotal,
                record.tax,
                record.total,
                image_name,
            ],
        )?;
        let invoice_id = tx.last_insert_rowid();

        for item in &record.items {
            tx.execute(
                "INSERT INTO items (invoice_id, description, amount, currency)
                 VALUES (?1, ?2, ?3, ?4)",
                params![invoice_id, item.description, item.amount, item.currency],
            )?;
        }

        tx.commit()?;
        info!(
            invoice_id,
            items = record.items.len(),
            image = %image_name,
            "Invoice stored"
        );
        Ok(invoice_id)
    }

    /// Get a single invoice by id.
    pub fn get_invoice(&self, id: i64) -> SqliteResult<Option<StoredInvoice>> {
        self.conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"),
                params![id],
                Self::row_to_invoice,
            )
            .optional()
    }

    /// All invoices, newest first (display order).
    pub fn list_invoices(&self) -> SqliteResult<Vec<StoredInvoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], Self::row_to_invoice)?;
        rows.collect()
    }

    /// Look up the invoice that references a given source image, if any.
    pub fn find_by_image(&self, image_name: &str) -> SqliteResult<Option<StoredInvoice>> {
        self.conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE image_name = ?1"),
                params![image_name],
                Self::row_to_invoice,
            )
            .optional()
    }

    /// All items belonging to one invoice, in insertion order.
    pub fn items_for_invoice(&self, invoice_id: i64) -> SqliteResult<Vec<StoredItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_id, description, amount, currency
             FROM items
             WHERE invoice_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![invoice_id], |row| {
            Ok(StoredItem {
                id: row.get(0)?,
                invoice_id: row.get(1)?,
                description: row.get(2)?,
                amount: row.get(3)?,
                currency: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Update an invoice's user-editable fields. Returns false when the
    /// invoice does not exist.
    pub fn update_invoice(&self, id: i64, edit: &InvoiceEdit) -> SqliteResult<bool> {
        let changed = self.conn.execute(
            "UPDATE invoices
             SET vendor_name = ?1, vendor_recipient = ?2, vendor_address = ?3,
                 invoice_date = ?4, invoice_number = ?5, subtotal = ?6, tax = ?7, total = ?8
             WHERE id = ?9",
            params![
                edit.vendor_name,
                edit.vendor_recipient,
                edit.vendor_address,
                edit.invoice_date,
                edit.invoice_number,
                edit.subtotal,
                edit.tax,
                edit.total,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Add one item to an existing invoice and refresh the parent's
    /// items-subtotal. Both writes land in one transaction.
    pub fn add_item(
        &mut self,
        invoice_id: i64,
        description: &str,
        amount: f64,
        currency: &str,
    ) -> SqliteResult<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO items (invoice_id, description, amount, currency)
             VALUES (?1, ?2, ?3, ?4)",
            params![invoice_id, description, amount, currency],
        )?;
        let item_id = tx.last_insert_rowid();
        Self::refresh_items_subtotal(&tx, invoice_id)?;
        tx.commit()?;
        Ok(item_id)
    }

    /// Update one item and refresh the parent's items-subtotal in the same
    /// transaction. Returns false when the item does not exist.
    pub fn update_item(
        &mut self,
        item_id: i64,
        description: &str,
        amount: f64,
        currency: &str,
    ) -> SqliteResult<bool> {
        let tx = self.conn.transaction()?;
        let invoice_id: Option<i64> = tx
            .query_row(
                "SELECT invoice_id FROM items WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(invoice_id) = invoice_id else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE items SET description = ?1, amount = ?2, currency = ?3 WHERE id = ?4",
            params![description, amount, currency, item_id],
        )?;
        Self::refresh_items_subtotal(&tx, invoice_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Delete one item and refresh the parent's items-subtotal in the same
    /// transaction. A missing item is a no-op.
    pub fn delete_item(&mut self, item_id: i64) -> SqliteResult<bool> {
        let tx = self.conn.transaction()?;
        let invoice_id: Option<i64> = tx
            .query_row(
                "SELECT invoice_id FROM items WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(invoice_id) = invoice_id else {
            return Ok(false);
        };

        tx.execute("DELETE FROM items WHERE id = ?1", params![item_id])?;
        Self::refresh_items_subtotal(&tx, invoice_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Recompute the sum of an invoice's item amounts and persist it.
    pub fn recompute_items_subtotal(&mut self, invoice_id: i64) -> SqliteResult<f64> {
        let tx = self.conn.transaction()?;
        let sum = Self::refresh_items_subtotal(&tx, invoice_id)?;
        tx.commit()?;
        Ok(sum)
    }

    /// Helper: sum the current item amounts and write the result onto the
    /// invoice, within the caller's transaction.
    fn refresh_items_subtotal(conn: &Connection, invoice_id: i64) -> SqliteResult<f64> {
        let sum: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM items WHERE invoice_id = ?1",
            params![invoice_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "UPDATE invoices SET items_subtotal = ?1 WHERE id = ?2",
            params![sum, invoice_id],
        )?;
        Ok(sum)
    }

    /// Delete an invoice together with all of its items.
    ///
    /// Returns the invoice's image name so the caller can unlink the file
    /// from the done store; `None` (still success) when the invoice was
    /// already gone.
    pub fn delete_invoice(&mut self, id: i64) -> SqliteResult<Option<String>> {
        let tx = self.conn.transaction()?;

        let image_name: Option<String> = tx
            .query_row(
                "SELECT image_name FROM invoices WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(image_name) = image_name else {
            return Ok(None);
        };

        tx.execute("DELETE FROM items WHERE invoice_id = ?1", params![id])?;
        tx.execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
        tx.commit()?;

        info!(invoice_id = id, image = %image_name, "Invoice deleted");
        Ok(Some(image_name))
    }

    /// Spending rollup per vendor, largest first. Uses the invoice total
    /// when present, falling back to the computed items-subtotal.
    pub fn totals_by_vendor(&self) -> SqliteResult<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT vendor_name, SUM(COALESCE(total, items_subtotal)) AS spent
             FROM invoices
             GROUP BY vendor_name
             ORDER BY spent DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Spending rollup per calendar month ("YYYY-MM"), newest first.
    /// Invoices with no recognized date are excluded.
    pub fn totals_by_month(&self) -> SqliteResult<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT strftime('%Y-%m', invoice_date) AS month,
                    SUM(COALESCE(total, items_subtotal)) AS spent
             FROM invoices
             WHERE invoice_date IS NOT NULL
             GROUP BY month
             ORDER BY month DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Get invoice and item counts.
    pub fn counts(&self) -> SqliteResult<(usize, usize)> {
        let invoices: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))?;
        let items: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok((invoices, items))
    }

    /// Helper: map a row with the 11-column invoice projection.
    fn row_to_invoice(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredInvoice> {
        Ok(StoredInvoice {
            id: row.get(0)?,
            vendor_name: row.get(1)?,
            vendor_recipient: row.get(2)?,
            vendor_address: row.get(3)?,
            invoice_date: row.get(4)?,
            invoice_number: row.get(5)?,
            items_subtotal: row.get(6)?,
            subtotal: row.get(7)?,
            tax: row.get(8)?,
            total: row.get(9)?,
            image_name: row.get(10)?,
        })
    }
}
