// src/invoice.rs

use serde_json::Value;

/// A single extracted line entry belonging to an invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedItem {
    pub description: String,
    pub amount: f64,
    pub currency: String,
}

/// A fully mapped candidate invoice, ready for persistence.
#[derive(Debug, Clone, Default)]
pub struct ExtractedInvoice {
    pub vendor_name: String,
    pub vendor_recipient: String,
    pub vendor_address: String,
    /// ISO date string, e.g. "2025-01-31".
    pub invoice_date: Option<String>,
    pub invoice_number: String,
    /// Sum of item amounts. Always numeric, 0 when no items were detected.
    pub items_subtotal: f64,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
    pub items: Vec<ExtractedItem>,
}

impl ExtractedInvoice {
    /// How many of the scalar fields were successfully extracted.
    pub fn coverage(&self) -> (usize, usize) {
        let total = 8;
        let filled = [
            !self.vendor_name.is_empty(),
            !self.vendor_recipient.is_empty(),
            !self.vendor_address.is_empty(),
            self.invoice_date.is_some(),
            !self.invoice_number.is_empty(),
            self.subtotal.is_some(),
            self.tax.is_some(),
            self.total.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }
}

/// Read a loosely typed OCR amount as a number, if it is one.
///
/// The service usually returns plain JSON numbers, but amounts have been
/// observed as strings (and occasionally as empty strings on partial
/// recognition).
pub fn numeric_amount(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a loosely typed OCR amount for summation: non-numeric is 0.
pub fn numeric_or_zero(value: Option<&Value>) -> f64 {
    numeric_amount(value).unwrap_or(0.0)
}

/// Sum of item amounts; 0 for an empty item list.
pub fn items_subtotal(items: &[ExtractedItem]) -> f64 {
    items.iter().map(|i| i.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(numeric_or_zero(Some(&json!(150))), 150.0);
        assert_eq!(numeric_or_zero(Some(&json!(29.5))), 29.5);
        assert_eq!(numeric_or_zero(Some(&json!("120"))), 120.0);
        assert_eq!(numeric_or_zero(Some(&json!(""))), 0.0);
        assert_eq!(numeric_or_zero(Some(&json!("n/a"))), 0.0);
        assert_eq!(numeric_or_zero(Some(&json!(null))), 0.0);
        assert_eq!(numeric_or_zero(None), 0.0);
    }

    #[test]
    fn test_items_subtotal() {
        let items = vec![
            ExtractedItem {
                description: "おにぎり".to_string(),
                amount: 150.0,
                currency: "JPY".to_string(),
            },
            ExtractedItem {
                description: "お茶".to_string(),
                amount: 120.0,
                currency: "JPY".to_string(),
            },
        ];
        assert_eq!(items_subtotal(&items), 270.0);
        assert_eq!(items_subtotal(&[]), 0.0);
    }

    #[test]
    fn test_coverage() {
        let empty = ExtractedInvoice::default();
        assert_eq!(empty.coverage(), (0, 8));

        let partial = ExtractedInvoice {
            vendor_name: "コンビニA".to_string(),
            total: Some(297.0),
            ..Default::default()
        };
        assert_eq!(partial.coverage(), (2, 8));
    }
}
