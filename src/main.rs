mod config;
mod expense_db;
mod intake;
mod invoice;
mod ocr_extract;
mod persist;

use expense_db::ExpenseStore;
use intake::IntakeWatcher;
use ocr_extract::OcrClient;
use std::time::Duration;
use tracing::info;

const CONFIG_PATH: &str = ".config/receipt_ingest.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cfg = config::Config::load(CONFIG_PATH)?;
    let api_key =
        std::env::var("OCR_API_KEY").map_err(|_| "OCR_API_KEY env var required for the OCR service")?;

    std::fs::create_dir_all(&cfg.waiting_dir)?;
    std::fs::create_dir_all(&cfg.done_dir)?;

    let mut store = ExpenseStore::new(&cfg.db_path)?;
    let ocr = OcrClient::new(&cfg.ocr.base_url, &api_key, &cfg.ocr.model);

    // Print statistics
    let (invoices, items) = store.counts()?;
    info!(invoices, items, "Database statistics");

    let watcher = IntakeWatcher::new(
        &cfg.waiting_dir,
        &cfg.done_dir,
        Duration::from_secs(cfg.poll_interval_secs),
    );
    watcher.run(&mut store, &ocr).await;

    Ok(())
}
