//! AI backend request and response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A structured generation call: prompt plus the JSON schema the output
/// must satisfy
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// Schema name sent to backends that require one (`spending_analysis`)
    pub name: String,
    /// System instructions, if the prompt has a system section
    pub system: Option<String>,
    /// Rendered user prompt
    pub prompt: String,
    /// JSON Schema of the expected output
    pub schema: serde_json::Value,
    pub temperature: f32,
}

impl StructuredRequest {
    /// Build a request whose schema is derived from `T`
    pub fn for_output<T: StructuredOutput>(
        system: Option<String>,
        prompt: String,
        temperature: f32,
    ) -> Result<Self> {
        let mut schema = serde_json::to_value(schemars::schema_for!(T))?;
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
        }
        Ok(Self {
            name: T::NAME.to_string(),
            system,
            prompt,
            schema,
            temperature,
        })
    }
}

/// Output type of a structured generation call
///
/// Deserialization checks shape; `validate` checks the cardinality
/// constraints a schema can state but a model may still ignore.
pub trait StructuredOutput: DeserializeOwned + JsonSchema {
    /// Schema name
    const NAME: &'static str;

    fn validate(&self) -> Result<()>;
}

/// ANALYZE stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpendingAnalysis {
    /// Short observations about the retrieved spending, one per bullet
    #[schemars(length(min = 3, max = 5))]
    pub bullet_points: Vec<String>,
}

impl StructuredOutput for SpendingAnalysis {
    const NAME: &'static str = "spending_analysis";

    fn validate(&self) -> Result<()> {
        check_len("bullet_points", self.bullet_points.len(), 3, 5)
    }
}

/// ANSWER stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdvisorAnswer {
    /// Direct answer to the user's question
    pub response: String,
    /// Practical money-management tips
    #[schemars(length(min = 2, max = 3))]
    pub tips: Vec<String>,
}

impl StructuredOutput for AdvisorAnswer {
    const NAME: &'static str = "advisor_answer";

    fn validate(&self) -> Result<()> {
        check_len("tips", self.tips.len(), 2, 3)
    }
}

fn check_len(field: &str, len: usize, min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&len) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} must have {}-{} items, got {}",
            field, min, max, len
        )))
    }
}
