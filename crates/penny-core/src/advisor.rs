//! Advisor pipeline: RETRIEVE → ANALYZE → ANSWER
//!
//! Each question runs the three stages once, in order, over a fresh
//! [`AdvisorState`]. Generation errors and schema violations end the run;
//! nothing is retried.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use serde::Serialize;
use tracing::{debug, info};

use crate::ai::{
    generate_structured, AIClient, AdvisorAnswer, SpendingAnalysis, StructuredOutput,
    StructuredRequest,
};
use crate::error::{Error, Result};
use crate::index::{IndexService, RecordMetadata, ScoredRecord};
use crate::models::DEFAULT_CURRENCY;
use crate::prompts::{PromptId, PromptLibrary};

/// Category label for records without one
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// What the retrieved records add up to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedSummary {
    /// Record texts in rank order, separated by blank lines
    pub context: String,
    /// Distinct categories in first-seen order
    pub categories: Vec<String>,
    /// Sum of amounts per (category, currency)
    pub totals: BTreeMap<(String, String), f64>,
}

/// Per-question pipeline state, discarded after the response
#[derive(Debug, Clone, Default)]
pub struct AdvisorState {
    pub question: String,
    pub retrieved_context: String,
    pub retrieved: Vec<RecordMetadata>,
    pub categories: Vec<String>,
    pub totals: BTreeMap<(String, String), f64>,
    pub analysis_points: Vec<String>,
    pub answer: String,
    pub tips: Vec<String>,
}

/// Final result of a question
#[derive(Debug, Clone, Serialize)]
pub struct AdvisorOutcome {
    pub answer: String,
    pub retrieved_context: String,
    pub analysis_points: Vec<String>,
    pub tips: Vec<String>,
}

impl From<AdvisorState> for AdvisorOutcome {
    fn from(state: AdvisorState) -> Self {
        Self {
            answer: state.answer,
            retrieved_context: state.retrieved_context,
            analysis_points: state.analysis_points,
            tips: state.tips,
        }
    }
}

/// Summarize retrieved records
///
/// A record id counts once per call, however many times it was retrieved.
/// Records with no usable amount still contribute their category.
pub fn aggregate_retrieved(records: &[ScoredRecord]) -> RetrievedSummary {
    let context = records
        .iter()
        .map(|r| r.record.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut categories: Vec<String> = Vec::new();
    let mut totals: BTreeMap<(String, String), f64> = BTreeMap::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for scored in records {
        let meta = &scored.record.metadata;

        if let Some(ref id) = meta.id {
            if !seen_ids.insert(id.as_str()) {
                continue;
            }
        }

        let category = meta
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_CATEGORY)
            .to_string();

        if !categories.contains(&category) {
            categories.push(category.clone());
        }

        let Some(amount) = meta.amount_value() else {
            continue;
        };
        let currency = meta
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string();

        *totals.entry((category, currency)).or_insert(0.0) += amount;
    }

    RetrievedSummary {
        context,
        categories,
        totals,
    }
}

/// Render totals as prompt lines
pub fn format_totals(totals: &BTreeMap<(String, String), f64>) -> String {
    if totals.is_empty() {
        return "(no amounts available)".to_string();
    }
    totals
        .iter()
        .map(|((category, currency), total)| format!("- {} ({}): {:.2}", category, currency, total))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Response text plus a tips section when there are tips
pub fn compose_answer(response: &str, tips: &[String]) -> String {
    if tips.is_empty() {
        return response.to_string();
    }
    let lines: Vec<String> = tips.iter().map(|t| format!("- {}", t)).collect();
    format!("{}\n\nTips:\n{}", response, lines.join("\n"))
}

/// The advisor pipeline over shared services
pub struct Advisor<'a> {
    index: &'a IndexService,
    ai: &'a AIClient,
    prompts: &'a RwLock<PromptLibrary>,
    top_k: usize,
}

impl<'a> Advisor<'a> {
    pub fn new(
        index: &'a IndexService,
        ai: &'a AIClient,
        prompts: &'a RwLock<PromptLibrary>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            ai,
            prompts,
            top_k,
        }
    }

    /// Run all three stages for one question
    pub async fn ask(&self, question: &str) -> Result<AdvisorOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyInput("question must not be empty".into()));
        }

        let mut state = self.retrieve(question).await?;
        self.analyze(&mut state).await?;
        self.answer(&mut state).await?;

        info!(
            retrieved = state.retrieved.len(),
            categories = state.categories.len(),
            tips = state.tips.len(),
            "Answered question"
        );
        Ok(state.into())
    }

    /// RETRIEVE: similarity search plus category/total aggregation
    pub async fn retrieve(&self, question: &str) -> Result<AdvisorState> {
        let hits = self.index.similarity_search(question, self.top_k).await?;
        let summary = aggregate_retrieved(&hits);
        debug!(hits = hits.len(), categories = ?summary.categories, "Retrieved context");

        Ok(AdvisorState {
            question: question.to_string(),
            retrieved_context: summary.context,
            retrieved: hits.into_iter().map(|h| h.record.metadata).collect(),
            categories: summary.categories,
            totals: summary.totals,
            ..Default::default()
        })
    }

    /// ANALYZE: 3-5 bullet points covering every retrieved category
    pub async fn analyze(&self, state: &mut AdvisorState) -> Result<()> {
        let categories = if state.categories.is_empty() {
            "(none)".to_string()
        } else {
            state.categories.join(", ")
        };
        let totals = format_totals(&state.totals);

        let mut vars = HashMap::new();
        vars.insert("question", state.question.as_str());
        vars.insert("context", state.retrieved_context.as_str());
        vars.insert("categories", categories.as_str());
        vars.insert("totals", totals.as_str());

        let request = self.request::<SpendingAnalysis>(PromptId::AnalyzeSpending, &vars)?;
        let analysis: SpendingAnalysis = generate_structured(self.ai, &request).await?;
        state.analysis_points = analysis.bullet_points;
        Ok(())
    }

    /// ANSWER: direct response plus 2-3 tips
    pub async fn answer(&self, state: &mut AdvisorState) -> Result<()> {
        let analysis = state
            .analysis_points
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars = HashMap::new();
        vars.insert("question", state.question.as_str());
        vars.insert("context", state.retrieved_context.as_str());
        vars.insert("analysis", analysis.as_str());

        let request = self.request::<AdvisorAnswer>(PromptId::AnswerQuestion, &vars)?;
        let answer: AdvisorAnswer = generate_structured(self.ai, &request).await?;

        state.answer = compose_answer(&answer.response, &answer.tips);
        state.tips = answer.tips;
        Ok(())
    }

    fn request<T: StructuredOutput>(
        &self,
        id: PromptId,
        vars: &HashMap<&str, &str>,
    ) -> Result<StructuredRequest> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        let prompt = prompts.get(id)?;
        let system = prompt.system_section().map(str::to_string);
        StructuredRequest::for_output::<T>(system, prompt.render_user(vars), prompt.temperature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::index::IndexRecord;
    use crate::ledger::Ledger;
    use crate::models::Transaction;
    use crate::receipt::parse_receipt;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn key(category: &str, currency: &str) -> (String, String) {
        (category.to_string(), currency.to_string())
    }

    fn hit(id: &str, category: Option<&str>, amount: Option<f64>, currency: Option<&str>) -> ScoredRecord {
        ScoredRecord {
            record: IndexRecord {
                text: format!("Transaction ID: {}", id),
                metadata: RecordMetadata {
                    id: Some(id.to_string()),
                    category: category.map(str::to_string),
                    amount,
                    currency: currency.map(str::to_string),
                    ..Default::default()
                },
            },
            score: 1.0,
        }
    }

    #[test]
    fn test_aggregate_context_and_categories() {
        let hits = vec![
            hit("a", Some("eating_out"), Some(10.00), Some("USD")),
            hit("b", None, Some(3.00), Some("USD")),
            hit("c", Some("groceries"), Some(5.00), Some("EUR")),
            hit("d", Some("eating_out"), Some(2.50), Some("USD")),
        ];
        let summary = aggregate_retrieved(&hits);

        assert_eq!(
            summary.context,
            "Transaction ID: a\n\nTransaction ID: b\n\nTransaction ID: c\n\nTransaction ID: d"
        );
        assert_eq!(summary.categories, vec!["eating_out", "unknown", "groceries"]);
        assert_eq!(summary.totals[&key("eating_out", "USD")], 12.5);
        assert_eq!(summary.totals[&key("unknown", "USD")], 3.0);
        assert_eq!(summary.totals[&key("groceries", "EUR")], 5.0);
    }

    #[test]
    fn test_aggregate_counts_duplicate_id_once() {
        let hits = vec![
            hit("a", Some("shopping"), Some(20.00), Some("USD")),
            hit("a", Some("shopping"), Some(20.00), Some("USD")),
        ];
        let summary = aggregate_retrieved(&hits);
        assert_eq!(summary.totals[&key("shopping", "USD")], 20.0);
        assert_eq!(summary.totals.len(), 1);
    }

    #[test]
    fn test_aggregate_skips_missing_amounts_keeps_category() {
        let hits = vec![
            hit("a", Some("housing"), None, Some("USD")),
            hit("b", Some("utilities"), Some(f64::NAN), None),
        ];
        let summary = aggregate_retrieved(&hits);
        assert_eq!(summary.categories, vec!["housing", "utilities"]);
        assert!(summary.totals.is_empty());
    }

    #[test]
    fn test_aggregate_blank_currency_is_usd() {
        let hits = vec![hit("a", Some("transport"), Some(7.25), Some("  "))];
        let summary = aggregate_retrieved(&hits);
        assert_eq!(summary.totals[&key("transport", "USD")], 7.25);
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(aggregate_retrieved(&[]), RetrievedSummary::default());
    }

    #[test]
    fn test_compose_answer() {
        assert_eq!(compose_answer("Plain.", &[]), "Plain.");
        assert_eq!(
            compose_answer("You spent $42.50.", &["Cook more".into(), "Track weekly".into()]),
            "You spent $42.50.\n\nTips:\n- Cook more\n- Track weekly"
        );
    }

    #[test]
    fn test_format_totals() {
        let mut totals = BTreeMap::new();
        totals.insert(("eating_out".to_string(), "USD".to_string()), 42.5);
        assert_eq!(format_totals(&totals), "- eating_out (USD): 42.50");
        assert_eq!(format_totals(&BTreeMap::new()), "(no amounts available)");
    }

    struct Fixture {
        _dir: TempDir,
        index: IndexService,
        mock: MockBackend,
        ai: AIClient,
        prompts: RwLock<PromptLibrary>,
    }

    fn fixture(receipts: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::in_dir(dir.path()).unwrap());
        for text in receipts {
            ledger
                .append(&Transaction::from_parsed(parse_receipt(text), *text))
                .unwrap();
        }
        let mock = MockBackend::new();
        let ai = AIClient::Mock(mock.clone());
        let index = IndexService::new(dir.path().join("vectorstore"), ai.clone(), ledger);
        Fixture {
            _dir: dir,
            index,
            mock,
            ai,
            prompts: RwLock::new(PromptLibrary::embedded_only()),
        }
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end() {
        let f = fixture(&["Joe's Diner\n2025-03-01\nTotal $42.50", "Costco\nTotal 80.00"]);
        f.mock.push_response(r#"{"bullet_points": ["a", "b", "c"]}"#);
        f.mock
            .push_response(r#"Here: {"response": "Mostly food.", "tips": ["x", "y"]}"#);

        let advisor = Advisor::new(&f.index, &f.ai, &f.prompts, 8);
        let outcome = advisor.ask("Where does my money go?").await.unwrap();

        assert_eq!(outcome.analysis_points, vec!["a", "b", "c"]);
        assert_eq!(outcome.tips, vec!["x", "y"]);
        assert_eq!(outcome.answer, "Mostly food.\n\nTips:\n- x\n- y");
        assert!(outcome.retrieved_context.contains("Merchant: Joe's Diner"));
        assert!(outcome.retrieved_context.contains("Merchant: Costco"));

        let requests = f.mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].name, "spending_analysis");
        assert!((requests[0].temperature - 0.2).abs() < 1e-6);
        assert!(requests[0].prompt.contains("eating_out"));
        assert!(requests[0].prompt.contains("groceries"));
        assert!(requests[0].prompt.contains("- eating_out (USD): 42.50"));
        assert!(requests[0].system.is_some());

        assert_eq!(requests[1].name, "advisor_answer");
        assert!((requests[1].temperature - 0.3).abs() < 1e-6);
        assert!(requests[1].prompt.contains("- a\n- b\n- c"));
    }

    #[tokio::test]
    async fn test_placeholder_only_index() {
        let f = fixture(&[]);
        let advisor = Advisor::new(&f.index, &f.ai, &f.prompts, 8);
        let state = advisor.retrieve("anything?").await.unwrap();

        assert_eq!(state.categories, vec![UNKNOWN_CATEGORY]);
        assert!(state.totals.is_empty());
        assert!(state.retrieved_context.starts_with("This is a placeholder transaction."));
    }

    #[tokio::test]
    async fn test_invalid_analysis_is_fatal() {
        let f = fixture(&["Cafe\nTotal 4.50"]);
        f.mock.push_response(r#"{"bullet_points": ["only", "two"]}"#);

        let advisor = Advisor::new(&f.index, &f.ai, &f.prompts, 8);
        let err = advisor.ask("How much on coffee?").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // No ANSWER call after a failed ANALYZE
        assert_eq!(f.mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_error_propagates() {
        let f = fixture(&["Cafe\nTotal 4.50"]);
        f.mock.push_response(r#"{"bullet_points": ["a", "b", "c"]}"#);
        f.mock.push_error("model unavailable");

        let advisor = Advisor::new(&f.index, &f.ai, &f.prompts, 8);
        assert!(advisor.ask("How much on coffee?").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let f = fixture(&[]);
        let advisor = Advisor::new(&f.index, &f.ai, &f.prompts, 8);
        assert!(matches!(
            advisor.ask("   ").await,
            Err(Error::EmptyInput(_))
        ));
        assert!(f.mock.requests().is_empty());
    }
}
