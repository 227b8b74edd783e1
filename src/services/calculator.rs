//! Natural-language financial calculator

use crate::extraction::{CurrencyNormalizer, ExtractedPayload, ResponseParser};
use crate::generator::is_failure_sentinel;
use crate::models::{CalculationResult, NewCalculation};
use crate::prompts::calculator_prompt;
use crate::services::InsightContext;
use crate::Result;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

pub const NO_QUERY: &str = "No query provided";
pub const NO_RESULT: &str = "No result";
pub const NO_EXPLANATION: &str = "No explanation";
pub const REPHRASE_HINT: &str = "Please try rephrasing your question for better results.";
pub const CALCULATION_UNAVAILABLE: &str =
    "The calculation service is temporarily unavailable. Please try again later.";
pub const CALCULATION_FAILED: &str =
    "An error occurred while processing your calculation. Please try again later.";

/// Result, explanation and insights of one calculation
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationFields {
    pub result: String,
    pub explanation: String,
    pub insights: Vec<String>,
}

impl CalculationFields {
    pub fn into_draft(self, user_id: Uuid, query: String) -> NewCalculation {
        NewCalculation {
            user_id,
            query,
            result: self.result,
            explanation: self.explanation,
            insights: self.insights,
        }
    }
}

pub struct CalculatorService {
    ctx: InsightContext,
}

impl CalculatorService {
    pub fn new(ctx: InsightContext) -> Self {
        Self { ctx }
    }

    pub async fn calculate(&self, user_id: Uuid, query: &str) -> Result<CalculationResult> {
        let query = self.ctx.parser.normalizer().normalize_str(query.trim());

        if query.is_empty() {
            let calculation = self
                .ctx
                .store
                .create_calculation(empty_query_calculation(user_id))
                .await?;
            return Ok(calculation.into());
        }

        let config = &self.ctx.config;
        let prompt = calculator_prompt(
            &query,
            &config.currency.target_marker,
            &config.currency.source_marker,
        );
        let reply = self
            .ctx
            .generator
            .generate(&prompt, config.limits.calculator_max_tokens)
            .await;

        let fields = calculation_from_reply(&self.ctx.parser, &reply);
        let calculation = self
            .ctx
            .store
            .create_calculation(fields.into_draft(user_id, query))
            .await?;

        info!(user_id = %user_id, calculation_id = %calculation.id, "Calculation complete");
        Ok(calculation.into())
    }
}

pub fn empty_query_calculation(user_id: Uuid) -> NewCalculation {
    NewCalculation {
        user_id,
        query: String::new(),
        result: NO_QUERY.to_string(),
        explanation: "Please enter a financial question to calculate.".to_string(),
        insights: Vec::new(),
    }
}

/// Placeholder stored when a calculation fails outright
pub fn failed_calculation(user_id: Uuid, query: &str, normalizer: &CurrencyNormalizer) -> NewCalculation {
    NewCalculation {
        user_id,
        query: normalizer.normalize_str(query.trim()),
        result: "Error".to_string(),
        explanation: CALCULATION_FAILED.to_string(),
        insights: Vec::new(),
    }
}

pub fn calculation_from_reply(parser: &ResponseParser, reply: &str) -> CalculationFields {
    if is_failure_sentinel(reply) {
        return CalculationFields {
            result: "Unavailable".to_string(),
            explanation: CALCULATION_UNAVAILABLE.to_string(),
            insights: vec![REPHRASE_HINT.to_string()],
        };
    }

    match parser.parse(reply) {
        ExtractedPayload::Structured { value, .. } => CalculationFields {
            result: text_field(&value, "result", parser.normalizer())
                .unwrap_or_else(|| NO_RESULT.to_string()),
            explanation: text_field(&value, "explanation", parser.normalizer())
                .unwrap_or_else(|| NO_EXPLANATION.to_string()),
            insights: value
                .get("insights")
                .map(|v| insights_from_value(v, parser.normalizer()))
                .unwrap_or_default(),
        },
        ExtractedPayload::Degraded { scalar, note, .. } => CalculationFields {
            result: scalar,
            explanation: if note.is_empty() {
                NO_EXPLANATION.to_string()
            } else {
                note
            },
            insights: vec![REPHRASE_HINT.to_string()],
        },
    }
}

fn text_field(value: &Value, key: &str, normalizer: &CurrencyNormalizer) -> Option<String> {
    let text = match value.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => render(other, normalizer),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Array of strings, a string holding a JSON array, or a single string
fn insights_from_value(value: &Value, normalizer: &CurrencyNormalizer) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(render(other, normalizer)),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(nested @ Value::Array(_)) => {
                insights_from_value(&normalizer.normalize_value(nested), normalizer)
            }
            _ => vec![s.trim().to_string()],
        },
        Value::Null => Vec::new(),
        other => vec![render(other, normalizer)],
    }
}

/// JSON text of a non-string value; object keys still carry raw markers
fn render(value: &Value, normalizer: &CurrencyNormalizer) -> String {
    normalizer.normalize_str(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsightConfig;
    use crate::generator::{ScriptedGenerator, ERROR_MARKER};
    use crate::store::{FinanceStore, InMemoryFinanceStore};
    use std::sync::Arc;

    fn calculator(generator: Arc<ScriptedGenerator>, store: Arc<InMemoryFinanceStore>) -> CalculatorService {
        CalculatorService::new(InsightContext::new(generator, store, InsightConfig::default()))
    }

    #[test]
    fn test_structured_reply_fields() {
        let fields = calculation_from_reply(
            &ResponseParser::default(),
            r#"{"result": 525, "explanation": "Simple interest of $25", "insights": ["Compounding adds more", "Check fees"]}"#,
        );
        assert_eq!(fields.result, "525");
        assert_eq!(fields.explanation, "Simple interest of ₹25");
        assert_eq!(fields.insights, vec!["Compounding adds more", "Check fees"]);
    }

    #[test]
    fn test_missing_fields_and_string_insights() {
        let parser = ResponseParser::default();

        let fields = calculation_from_reply(&parser, r#"{"insights": "[\"Pay early\", \"Save $10\"]"}"#);
        assert_eq!(fields.result, NO_RESULT);
        assert_eq!(fields.explanation, NO_EXPLANATION);
        assert_eq!(fields.insights, vec!["Pay early", "Save ₹10"]);

        let fields = calculation_from_reply(&parser, r#"{"result": "₹100", "insights": "Just one tip"}"#);
        assert_eq!(fields.result, "₹100");
        assert_eq!(fields.insights, vec!["Just one tip"]);
    }

    #[test]
    fn test_non_string_items_are_normalized() {
        let fields = calculation_from_reply(
            &ResponseParser::default(),
            r#"{"result": {"$total": 525}, "insights": [{"$fee": 5}, 3]}"#,
        );
        assert_eq!(fields.result, "{\"₹total\":525}");
        assert_eq!(fields.insights, vec!["{\"₹fee\":5}", "3"]);
    }

    #[test]
    fn test_sentinel_reply() {
        let fields = calculation_from_reply(
            &ResponseParser::default(),
            &format!("{} connection refused", ERROR_MARKER),
        );
        assert_eq!(fields.explanation, CALCULATION_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_dollar_query_with_prose_reply() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "Your investment grows to $525 by the end of the term.",
        ]));
        let user = Uuid::new_v4();

        let result = calculator(generator.clone(), store.clone())
            .calculate(user, "$500 at 5% for 2 years")
            .await
            .unwrap();

        assert!(result.result.contains("₹525"));
        assert!(!result.explanation.is_empty());
        assert!(!result.explanation.contains('$'));
        assert_eq!(result.insights, vec![REPHRASE_HINT]);

        let prompts = generator.prompts().await;
        assert!(prompts[0].0.contains("₹500 at 5% for 2 years"));
        assert_eq!(prompts[0].1, 2048);

        let stored = store.list_calculations(user, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].query, "₹500 at 5% for 2 years");
        assert_eq!(stored[0].id, result.calculation_id);
    }

    #[tokio::test]
    async fn test_empty_query_skips_remote_call() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));

        let result = calculator(generator.clone(), store)
            .calculate(Uuid::new_v4(), "   ")
            .await
            .unwrap();

        assert_eq!(result.result, NO_QUERY);
        assert_eq!(generator.call_count(), 0);
    }
}
