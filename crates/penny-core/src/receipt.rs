//! Receipt parser: raw OCR text to structured fields

use crate::classify::{categorize, detect_currency};
use crate::extract::{extract_date, extract_merchant, extract_total_amount};
use crate::models::ParsedFields;

/// Parse receipt text into structured fields
///
/// Pure and infallible. Anything the heuristics can't find is left as `None`;
/// the category falls back to `other` and the currency to USD.
pub fn parse_receipt(raw_text: &str) -> ParsedFields {
    let amount = extract_total_amount(raw_text);
    let date = extract_date(raw_text);
    let merchant = extract_merchant(raw_text);
    let category = categorize(merchant.as_deref().unwrap_or(""), raw_text);
    let currency = detect_currency(raw_text);

    ParsedFields {
        date,
        merchant,
        category,
        amount,
        currency,
    }
}
