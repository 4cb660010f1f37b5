//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or code fences even when a
//! schema is requested, so the outermost `{...}` span is parsed.

use crate::error::{Error, Result};

use super::types::StructuredOutput;

const RAW_PREVIEW_LEN: usize = 200;

/// Locate the outermost JSON object in a model response
pub fn extract_json_object(response: &str) -> Option<&str> {
    let response = response.trim();
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Parse and validate a structured response
///
/// Malformed JSON is `InvalidData`; JSON that parses but breaks the
/// cardinality constraints is `Validation`.
pub fn parse_structured<T: StructuredOutput>(response: &str) -> Result<T> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        Error::InvalidData(format!(
            "No JSON found in AI response | Raw: {}",
            preview(response)
        ))
    })?;

    let value: T = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid {} JSON from AI: {} | Raw: {}",
            T::NAME,
            e,
            preview(json_str)
        ))
    })?;

    value.validate()?;
    Ok(value)
}

fn preview(s: &str) -> String {
    if s.chars().count() > RAW_PREVIEW_LEN {
        let cut: String = s.chars().take(RAW_PREVIEW_LEN).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{AdvisorAnswer, SpendingAnalysis};

    #[test]
    fn test_extract_json_object_with_prose() {
        let response = "Sure! Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```";
        assert_eq!(extract_json_object(response), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("} {"), None);
    }

    #[test]
    fn test_parse_analysis() {
        let analysis: SpendingAnalysis =
            parse_structured(r#"{"bullet_points": ["a", "b", "c", "d"]}"#).unwrap();
        assert_eq!(analysis.bullet_points.len(), 4);
    }

    #[test]
    fn test_parse_malformed_is_invalid_data() {
        let result = parse_structured::<AdvisorAnswer>(r#"{"response": "x", "tips": }"#);
        assert!(matches!(result, Err(Error::InvalidData(_))));

        let result = parse_structured::<AdvisorAnswer>("I cannot help with that");
        assert!(matches!(result, Err(Error::InvalidData(_))));

        let result = parse_structured::<AdvisorAnswer>(r#"{"answer": "wrong field"}"#);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_parse_cardinality_is_validation() {
        let result = parse_structured::<AdvisorAnswer>(r#"{"response": "x", "tips": []}"#);
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = parse_structured::<SpendingAnalysis>(r#"{"bullet_points": ["only one"]}"#);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "€".repeat(300);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), RAW_PREVIEW_LEN + 3);
    }
}
