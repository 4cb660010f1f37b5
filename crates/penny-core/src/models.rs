//! Domain models for Penny

use serde::{Deserialize, Serialize};

/// Currency code used when nothing on the receipt identifies one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Spending category
///
/// The set is closed: every transaction carries exactly one of these,
/// falling back to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Groceries,
    Transport,
    Shopping,
    EatingOut,
    Subscription,
    Housing,
    Utilities,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::Transport => "transport",
            Self::Shopping => "shopping",
            Self::EatingOut => "eating_out",
            Self::Subscription => "subscription",
            Self::Housing => "housing",
            Self::Utilities => "utilities",
            Self::Other => "other",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Self::Groceries,
            Self::Transport,
            Self::Shopping,
            Self::EatingOut,
            Self::Subscription,
            Self::Housing,
            Self::Utilities,
            Self::Other,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groceries" => Ok(Self::Groceries),
            "transport" => Ok(Self::Transport),
            "shopping" => Ok(Self::Shopping),
            "eating_out" | "eating out" | "dining" => Ok(Self::EatingOut),
            "subscription" | "subscriptions" => Ok(Self::Subscription),
            "housing" => Ok(Self::Housing),
            "utilities" => Ok(Self::Utilities),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Currencies the classifier can recognize on a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Inr,
    Cny,
    Cad,
    Aud,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Inr => "INR",
            Self::Cny => "CNY",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields recovered from receipt text by the heuristic parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub date: Option<String>,
    pub merchant: Option<String>,
    pub category: Category,
    pub amount: Option<f64>,
    pub currency: Currency,
}

/// A stored transaction
///
/// Created once from a parsed receipt and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub raw_text: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Transaction {
    /// Build a transaction with a fresh id from parsed receipt fields
    pub fn from_parsed(parsed: ParsedFields, raw_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: parsed.date,
            merchant: parsed.merchant,
            category: parsed.category,
            amount: parsed.amount,
            currency: parsed.currency.as_str().to_string(),
            raw_text: raw_text.into(),
        }
    }

    /// Whether the record satisfies the persistence invariants
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.raw_text.trim().is_empty()
    }
}
