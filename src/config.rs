use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "default_waiting_dir")]
    pub waiting_dir: String,
    #[serde(default = "default_done_dir")]
    pub done_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub ocr: OcrSection,
}

fn default_waiting_dir() -> String {
    "data/images".to_string()
}

fn default_done_dir() -> String {
    "data/done".to_string()
}

fn default_db_path() -> String {
    "data/expenses.db".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

#[derive(Deserialize)]
pub struct OcrSection {
    pub base_url: String,
    #[serde(default = "default_ocr_model")]
    pub model: String,
}

fn default_ocr_model() -> String {
    "prebuilt-invoice".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        let cfg: Config = toml::from_str(
            r#"
            [ocr]
            base_url = "https://ocr.example.net"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.waiting_dir, "data/images");
        assert_eq!(cfg.done_dir, "data/done");
        assert_eq!(cfg.db_path, "data/expenses.db");
        assert_eq!(cfg.poll_interval_secs, 5);
        assert_eq!(cfg.ocr.model, "prebuilt-invoice");
    }

    #[test]
    fn test_explicit_values() {
        let cfg: Config = toml::from_str(
            r#"
            waiting_dir = "/data/images"
            done_dir = "/data/done"
            db_path = "/data/expenses.db"
            poll_interval_secs = 30

            [ocr]
            base_url = "https://ocr.example.net/"
            model = "prebuilt-receipt"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.waiting_dir, "/data/images");
        assert_eq!(cfg.poll_interval_secs, 30);
        assert_eq!(cfg.ocr.model, "prebuilt-receipt");
    }
}
