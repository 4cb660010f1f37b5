//! Currency and category classification from receipt text
//!
//! Both classifiers are keyword tables evaluated in declared order. The
//! first rule that matches wins, so reordering a table changes results.

use crate::models::{Category, Currency};

/// Currency symbols, checked before any textual marker
const CURRENCY_SYMBOLS: &[(char, Currency)] = &[
    ('$', Currency::Usd),
    ('€', Currency::Eur),
    ('£', Currency::Gbp),
    ('₹', Currency::Inr),
    ('¥', Currency::Cny),
];

/// Case-insensitive textual currency markers
const CURRENCY_MARKERS: &[(&[&str], Currency)] = &[
    (&["inr"], Currency::Inr),
    (&["cny", "rmb"], Currency::Cny),
    (&["cad"], Currency::Cad),
    (&["aud"], Currency::Aud),
    (&["usd"], Currency::Usd),
    (&["eur"], Currency::Eur),
    (&["gbp"], Currency::Gbp),
];

/// Ordered category rules: groceries, transport, shopping, eating out,
/// subscription, housing, utilities.
pub const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (
        Category::Groceries,
        &[
            "costco",
            "walmart",
            "aldi",
            "kroger",
            "safeway",
            "whole foods",
            "grocery",
            "supermarket",
            "market",
            "foods",
        ],
    ),
    (
        Category::Transport,
        &[
            "uber",
            "lyft",
            "taxi",
            "cab",
            "fuel",
            "gas station",
            "shell",
            "bp",
            "chevron",
        ],
    ),
    (
        Category::Shopping,
        &[
            "amazon",
            "flipkart",
            "shopping",
            "mall",
            "target",
            "best buy",
            "electronics",
        ],
    ),
    (
        Category::EatingOut,
        &[
            "cafe",
            "restaurant",
            "pizza",
            "burger",
            "grill",
            "bistro",
            "coffee",
            "diner",
            "bar",
            "brew",
            "starbucks",
        ],
    ),
    (
        Category::Subscription,
        &[
            "netflix",
            "spotify",
            "apple",
            "aws",
            "gcp",
            "azure",
            "prime",
            "online invoicing",
            "software",
            "saas",
            "license",
        ],
    ),
    (
        Category::Housing,
        &["rent", "apartments", "property", "hotel", "inn", "villa"],
    ),
    (
        Category::Utilities,
        &[
            "electric",
            "water",
            "internet",
            "wifi",
            "broadband",
            "comcast",
            "verizon",
            "att",
        ],
    ),
];

/// Detect the receipt currency
///
/// A symbol anywhere in the text beats every textual marker. Falls back to
/// USD when nothing matches.
pub fn detect_currency(text: &str) -> Currency {
    for (symbol, currency) in CURRENCY_SYMBOLS {
        if text.contains(*symbol) {
            return *currency;
        }
    }

    let lower = text.to_lowercase();
    for (markers, currency) in CURRENCY_MARKERS {
        if markers.iter().any(|m| lower.contains(m)) {
            return *currency;
        }
    }

    Currency::Usd
}

/// Categorize a receipt from its merchant name and full text
pub fn categorize(merchant: &str, text: &str) -> Category {
    let combined = format!("{} {}", merchant, text).to_lowercase();

    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| combined.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_beats_word() {
        assert_eq!(detect_currency("Paid 12.00 € (usd equivalent 13.10)"), Currency::Eur);
    }

    #[test]
    fn test_symbol_order() {
        // Dollar sign is checked first
        assert_eq!(detect_currency("$4.00 / £3.10"), Currency::Usd);
        assert_eq!(detect_currency("£3.10 and ₹250"), Currency::Gbp);
        assert_eq!(detect_currency("¥1200"), Currency::Cny);
        assert_eq!(detect_currency("₹ 450.00"), Currency::Inr);
    }

    #[test]
    fn test_textual_markers() {
        assert_eq!(detect_currency("TOTAL 45.00 INR"), Currency::Inr);
        assert_eq!(detect_currency("Paid in RMB"), Currency::Cny);
        assert_eq!(detect_currency("Amount CAD 20.00"), Currency::Cad);
        assert_eq!(detect_currency("AUD 9.95"), Currency::Aud);
        assert_eq!(detect_currency("EUR 3.50"), Currency::Eur);
        assert_eq!(detect_currency("GBP 1.20"), Currency::Gbp);
    }

    #[test]
    fn test_textual_marker_priority() {
        // "cad" is tested before "eur"
        assert_eq!(detect_currency("cad / eur"), Currency::Cad);
    }

    #[test]
    fn test_currency_defaults_to_usd() {
        assert_eq!(detect_currency("Thank you for shopping"), Currency::Usd);
        assert_eq!(detect_currency(""), Currency::Usd);
    }

    #[test]
    fn test_categorize_known_merchants() {
        assert_eq!(categorize("Starbucks", ""), Category::EatingOut);
        assert_eq!(categorize("Whole Foods Market", ""), Category::Groceries);
        assert_eq!(categorize("Uber Trip", ""), Category::Transport);
        assert_eq!(categorize("Netflix", ""), Category::Subscription);
        assert_eq!(categorize("Comcast", ""), Category::Utilities);
        assert_eq!(categorize("Hilton Hotel", ""), Category::Housing);
    }

    #[test]
    fn test_categorize_unknown_is_other() {
        assert_eq!(categorize("Unknown Shop", ""), Category::Other);
        assert_eq!(categorize("", ""), Category::Other);
    }

    #[test]
    fn test_categorize_uses_full_text() {
        assert_eq!(
            categorize("Receipt", "Thanks for visiting our pizza place"),
            Category::EatingOut
        );
    }

    #[test]
    fn test_categorize_first_rule_wins() {
        // Matches both groceries ("market") and eating out ("coffee")
        assert_eq!(categorize("Coffee Market", ""), Category::Groceries);
        // Matches both transport ("shell") and utilities ("electric")
        assert_eq!(categorize("Shell Electric", ""), Category::Transport);
    }

    #[test]
    fn test_categorize_case_insensitive() {
        assert_eq!(categorize("AMAZON.COM", ""), Category::Shopping);
    }

    #[test]
    fn test_rule_table_order() {
        let order: Vec<Category> = CATEGORY_RULES.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            order,
            vec![
                Category::Groceries,
                Category::Transport,
                Category::Shopping,
                Category::EatingOut,
                Category::Subscription,
                Category::Housing,
                Category::Utilities,
            ]
        );
    }
}
