//! Heuristic field extraction from OCR receipt text
//!
//! Receipts are noisy. Each extractor works line by line over the trimmed,
//! non-empty lines of the text and gives up quietly (returns `None`)
//! rather than failing.

use std::sync::LazyLock;

use regex::Regex;

/// Money with exactly two decimals, optionally with thousands separators
/// (53.23, 1,234.56, 1234.56)
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})*(?:\.\d{2})|\d+\.\d{2})").expect("valid regex")
});

/// 2025-11-14, 11/14/2025, 11-14-2025, 11/14/25
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}|\d{2}[/-]\d{2}[/-]\d{4}|\d{2}[/-]\d{2}[/-]\d{2})")
        .expect("valid regex")
});

/// Keywords for the second extraction tier
const SECONDARY_AMOUNT_KEYWORDS: &[&str] = &["amount due", "amount", "subtotal", "balance"];

/// Values at or above this are treated as OCR noise in the last-resort tier
pub const MAX_FALLBACK_AMOUNT: f64 = 2000.0;

/// Line boundaries: `\n`, bare `\r`, vertical tab, form feed, the ASCII
/// separators and the Unicode next-line/line/paragraph separators
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_line_break).map(str::trim).filter(|l| !l.is_empty())
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

/// First amount on the first line accepted by `filter`
fn find_amount_in_lines<F>(text: &str, filter: F) -> Option<f64>
where
    F: Fn(&str) -> bool,
{
    for line in lines(text) {
        if !filter(&line.to_lowercase()) {
            continue;
        }
        let cleaned = line.replace('$', "");
        if let Some(m) = AMOUNT_RE.find(&cleaned) {
            if let Some(value) = parse_amount(m.as_str()) {
                return Some(value);
            }
        }
    }
    None
}

/// Extract the receipt total
///
/// 1. A line mentioning "total"
/// 2. A line mentioning "amount due", "amount", "subtotal" or "balance"
/// 3. The largest amount anywhere in the text within (0, 2000)
pub fn extract_total_amount(text: &str) -> Option<f64> {
    if let Some(amount) = find_amount_in_lines(text, |l| l.contains("total")) {
        return Some(amount);
    }

    if let Some(amount) = find_amount_in_lines(text, |l| {
        SECONDARY_AMOUNT_KEYWORDS.iter().any(|k| l.contains(k))
    }) {
        return Some(amount);
    }

    lines(text)
        .flat_map(|line| {
            let cleaned = line.replace('$', "");
            AMOUNT_RE
                .find_iter(&cleaned)
                .filter_map(|m| parse_amount(m.as_str()))
                .collect::<Vec<_>>()
        })
        .filter(|v| *v > 0.0 && *v < MAX_FALLBACK_AMOUNT)
        .max_by(f64::total_cmp)
}

/// Extract the first date-looking token, top to bottom
///
/// Dates are returned as written; nothing checks that the month or day
/// is in range.
pub fn extract_date(text: &str) -> Option<String> {
    lines(text).find_map(|line| DATE_RE.find(line).map(|m| m.as_str().to_string()))
}

/// Extract the merchant name: the first line with no digits and more than
/// two characters
pub fn extract_merchant(text: &str) -> Option<String> {
    lines(text)
        .find(|line| !line.chars().any(|c| c.is_ascii_digit()) && line.chars().count() > 2)
        .map(str::to_string)
}
