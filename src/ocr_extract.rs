// src/ocr_extract.rs

use crate::invoice::{ExtractedInvoice, ExtractedItem, items_subtotal, numeric_amount,
                     numeric_or_zero};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Items without a recognized currency code fall back to this.
const DEFAULT_CURRENCY: &str = "JPY";

/// Wrapper around the document-understanding service's invoice model.
///
/// One `analyze` call per image, no retries — retry policy belongs to the
/// caller, which simply leaves the file in the waiting area.
pub struct OcrClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

// ---------------------------------------------------------------------------
// Wire model: the service's invoice field bag, typed field by field.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    documents: Vec<AnalyzedDocument>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedDocument {
    #[serde(default)]
    fields: DocumentFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentFields {
    vendor_name: Option<TextField>,
    vendor_address: Option<TextField>,
    vendor_address_recipient: Option<TextField>,
    invoice_date: Option<DateField>,
    invoice_id: Option<TextField>,
    items: Option<ArrayField>,
    sub_total: Option<CurrencyField>,
    total_tax: Option<CurrencyField>,
    invoice_total: Option<CurrencyField>,
}

#[derive(Debug, Deserialize)]
struct TextField {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateField {
    #[serde(rename = "valueDate")]
    value_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrencyField {
    #[serde(rename = "valueCurrency")]
    value_currency: Option<CurrencyValue>,
}

#[derive(Debug, Deserialize)]
struct CurrencyValue {
    // Accepted as any JSON value: numbers normally, but strings (possibly
    // empty) show up on partial recognition.
    amount: Option<Value>,
    #[serde(rename = "currencyCode")]
    currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArrayField {
    #[serde(rename = "valueArray", default)]
    value_array: Vec<ItemEntry>,
}

#[derive(Debug, Deserialize)]
struct ItemEntry {
    #[serde(rename = "valueObject")]
    value_object: Option<ItemObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemObject {
    description: Option<TextField>,
    amount: Option<CurrencyField>,
}

impl OcrClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Submit raw image bytes and map the response into a candidate invoice.
    ///
    /// Service unreachable, non-2xx status, undecodable body and an empty
    /// `documents` array are all the same "extraction failed" outcome; no
    /// partial result is ever returned.
    pub async fn analyze(
        &self,
        image: &[u8],
    ) -> Result<ExtractedInvoice, Box<dyn std::error::Error>> {
        if image.is_empty() {
            return Err("Refusing to analyze an empty image".into());
        }

        let url = format!("{}/analyze?model={}", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .timeout(std::time::Duration::from_secs(60))
            .header("Ocr-Api-Key", &self.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("OCR API error {status}: {body}").into());
        }

        let analyze: AnalyzeResponse = response.json().await?;
        let doc = analyze
            .documents
            .into_iter()
            .next()
            .ok_or("OCR returned no documents for this image")?;

        let record = map_fields(doc.fields);
        info!(
            vendor = %record.vendor_name,
            items = record.items.len(),
            items_subtotal = record.items_subtotal,
            total = ?record.total,
            "OCR fields mapped"
        );
        Ok(record)
    }
}

/// Map the service's field bag onto the fixed invoice shape.
///
/// Each field is independently present-or-absent: text fields default to
/// empty strings, the date and the three currency totals stay `None` when
/// missing, item amounts are coerced to numbers with non-numeric as 0.
fn map_fields(fields: DocumentFields) -> ExtractedInvoice {
    let items: Vec<ExtractedItem> = fields
        .items
        .map(|a| a.value_array)
        .unwrap_or_default()
        .into_iter()
        // An entry with no valueObject still counts as one detected item
        .map(|entry| entry.value_object.unwrap_or_default())
        .map(|obj| {
            let description = text(obj.description);
            let (amount, currency) = match obj.amount.and_then(|c| c.value_currency) {
                Some(v) => (
                    numeric_or_zero(v.amount.as_ref()),
                    v.currency_code
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                ),
                None => (0.0, DEFAULT_CURRENCY.to_string()),
            };
            ExtractedItem {
                description,
                amount,
                currency,
            }
        })
        .collect();

    ExtractedInvoice {
        vendor_name: text(fields.vendor_name),
        vendor_recipient: text(fields.vendor_address_recipient),
        vendor_address: text(fields.vendor_address),
        invoice_date: fields.invoice_date.and_then(|d| d.value_date),
        invoice_number: text(fields.invoice_id),
        items_subtotal: items_subtotal(&items),
        subtotal: currency_amount(fields.sub_total),
        tax: currency_amount(fields.total_tax),
        total: currency_amount(fields.invoice_total),
        items,
    }
}

fn text(field: Option<TextField>) -> String {
    field.and_then(|t| t.content).unwrap_or_default()
}

fn currency_amount(field: Option<CurrencyField>) -> Option<f64> {
    let value = field.and_then(|c| c.value_currency)?;
    numeric_amount(value.amount.as_ref())
}
