//! Expense anomaly detection
//!
//! The statistics are left to the model; this module only prepares the
//! transaction window and maps whatever comes back onto anomaly records.

use crate::extraction::{amount_after_marker, amount_from_value, zero_money, ExtractedPayload, ResponseParser};
use crate::generator::is_failure_sentinel;
use crate::models::{AnomalyType, ExpenseAnomaly, NewAnomaly};
use crate::prompts::anomaly_prompt;
use crate::services::{input_or_default, InsightContext};
use crate::Result;
use chrono::Duration;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

pub const NOT_ENOUGH_TRANSACTIONS: &str =
    "Not enough transaction data to analyze. Please add more transactions.";
pub const NO_UNUSUAL_ACTIVITY: &str = "No unusual activity detected";
pub const DETECTION_UNAVAILABLE: &str =
    "Anomaly detection is temporarily unavailable. Please try again later.";
pub const DETECTION_FAILED: &str =
    "An error occurred while detecting anomalies. Please try again later.";

const GENERAL_CATEGORY: &str = "General";
const UNKNOWN_CATEGORY: &str = "Unknown";
const CATEGORY_LABEL: &str = "Category:";

pub struct AnomalyService {
    ctx: InsightContext,
}

impl AnomalyService {
    pub fn new(ctx: InsightContext) -> Self {
        Self { ctx }
    }

    pub async fn detect(&self, user_id: Uuid) -> Result<Vec<ExpenseAnomaly>> {
        let limits = &self.ctx.config.limits;
        let since = self.ctx.today() - Duration::days(limits.anomaly_window_days);

        let transactions = input_or_default(
            self.ctx
                .store
                .recent_transactions(user_id, since, limits.anomaly_max_transactions)
                .await,
            "transactions",
            user_id,
        );

        if transactions.is_empty() {
            debug!(user_id = %user_id, "No recent transactions; skipping remote call");
            let anomaly = self
                .ctx
                .store
                .create_anomaly(general_anomaly(user_id, NOT_ENOUGH_TRANSACTIONS))
                .await?;
            return Ok(vec![anomaly]);
        }

        let prompt = anomaly_prompt(&transactions, self.ctx.marker());
        let reply = self
            .ctx
            .generator
            .generate(&prompt, limits.default_max_tokens)
            .await;

        let drafts = anomalies_from_reply(&self.ctx.parser, user_id, &reply);
        let mut anomalies = Vec::with_capacity(drafts.len());
        for draft in drafts {
            anomalies.push(self.ctx.store.create_anomaly(draft).await?);
        }

        info!(
            user_id = %user_id,
            transactions = transactions.len(),
            anomalies = anomalies.len(),
            "Anomaly scan complete"
        );
        Ok(anomalies)
    }
}

/// Zero-amount record in the "General" category
pub fn general_anomaly(user_id: Uuid, description: &str) -> NewAnomaly {
    NewAnomaly {
        user_id,
        amount: zero_money(),
        category: GENERAL_CATEGORY.to_string(),
        anomaly_type: AnomalyType::UnusualAmount,
        description: description.to_string(),
    }
}

/// Map a raw reply onto anomaly drafts. Never returns an empty list.
pub fn anomalies_from_reply(parser: &ResponseParser, user_id: Uuid, reply: &str) -> Vec<NewAnomaly> {
    if is_failure_sentinel(reply) {
        return vec![general_anomaly(user_id, DETECTION_UNAVAILABLE)];
    }

    let entries = match parser.parse(reply) {
        ExtractedPayload::Structured { value, .. } => structured_entries(value),
        ExtractedPayload::Degraded { scalar, note, .. } => vec![json!({
            "type": "UNUSUAL_PATTERN",
            "description": note,
            "transaction": scalar,
        })],
    };

    if entries.is_empty() {
        return vec![general_anomaly(user_id, NO_UNUSUAL_ACTIVITY)];
    }

    entries
        .iter()
        .map(|entry| anomaly_from_entry(user_id, entry))
        .collect()
}

fn structured_entries(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("anomalies") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                map.insert("anomalies".to_string(), other);
                vec![Value::Object(map)]
            }
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

fn anomaly_from_entry(user_id: Uuid, entry: &Value) -> NewAnomaly {
    let empty = Map::new();
    let fields = match entry {
        Value::Object(map) => map,
        Value::String(text) => {
            return NewAnomaly {
                user_id,
                amount: amount_after_marker(text).unwrap_or_else(zero_money),
                category: category_label(text).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
                anomaly_type: AnomalyType::UnusualAmount,
                description: text.clone(),
            };
        }
        _ => &empty,
    };

    let anomaly_type = fields
        .get("type")
        .and_then(Value::as_str)
        .map(AnomalyType::classify)
        .unwrap_or(AnomalyType::UnusualAmount);

    let transaction = fields
        .get("transaction")
        .and_then(transaction_text)
        .filter(|text| text.trim() != "N/A");

    let amount = fields
        .get("amount")
        .and_then(amount_from_value)
        .or_else(|| transaction.as_deref().and_then(amount_after_marker))
        .unwrap_or_else(zero_money);

    let category = transaction
        .as_deref()
        .and_then(category_label)
        .or_else(|| {
            fields
                .get("category")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("Anomaly detected")
        .to_string();

    NewAnomaly {
        user_id,
        amount,
        category,
        anomaly_type,
        description,
    }
}

fn transaction_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Text after "Category:" up to the next comma
fn category_label(text: &str) -> Option<String> {
    let start = text.find(CATEGORY_LABEL)? + CATEGORY_LABEL.len();
    let label = text[start..].split(',').next()?.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsightConfig;
    use crate::generator::ScriptedGenerator;
    use crate::models::Transaction;
    use crate::store::{FinanceStore, InMemoryFinanceStore};
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use std::str::FromStr;
    use std::sync::Arc;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_entries_mapped_from_array() {
        let parser = ResponseParser::default();
        let user = Uuid::new_v4();
        let reply = r#"[
            {"type": "Unusual Category", "description": "First travel spend", "transaction": "Date: 2024-03-02, Category: Travel, Amount: ₹12,500.00"},
            {"type": "unusual frequency", "description": "Many small coffees", "transaction": "Date: 2024-03-03, Category: Dining, Amount: $45"},
            {"type": "unusual amount", "description": "Large rent", "transaction": "N/A", "category": "Housing"}
        ]"#;

        let drafts = anomalies_from_reply(&parser, user, reply);
        assert_eq!(drafts.len(), 3);

        assert_eq!(drafts[0].anomaly_type, AnomalyType::UnusualCategory);
        assert_eq!(drafts[0].amount, dec("12500.00"));
        assert_eq!(drafts[0].category, "Travel");

        assert_eq!(drafts[1].anomaly_type, AnomalyType::UnusualFrequency);
        assert_eq!(drafts[1].amount, dec("45"));
        assert_eq!(drafts[1].category, "Dining");

        assert_eq!(drafts[2].anomaly_type, AnomalyType::UnusualAmount);
        assert_eq!(drafts[2].amount, zero_money());
        assert_eq!(drafts[2].category, "Housing");
    }

    #[test]
    fn test_wrapped_and_single_object() {
        let parser = ResponseParser::default();
        let user = Uuid::new_v4();

        let wrapped = anomalies_from_reply(
            &parser,
            user,
            "{\"anomalies\": [{\"type\": \"category\", \"description\": \"x\"}, {\"type\": \"amount\"}]}",
        );
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[1].description, "Anomaly detected");
        assert_eq!(wrapped[1].category, "Unknown");

        let single = anomalies_from_reply(
            &parser,
            user,
            "Here it is: {\"type\": \"frequency\", \"description\": \"Daily taxi\", \"amount\": 300}",
        );
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].amount, dec("300"));
    }

    #[test]
    fn test_empty_array_means_nothing_unusual() {
        let drafts = anomalies_from_reply(&ResponseParser::default(), Uuid::new_v4(), "[]");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].description, NO_UNUSUAL_ACTIVITY);
        assert_eq!(drafts[0].category, "General");
    }

    #[test]
    fn test_degraded_reply_keeps_text() {
        let drafts = anomalies_from_reply(
            &ResponseParser::default(),
            Uuid::new_v4(),
            "Your spending on Travel of $1200 looks unusual",
        );
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].anomaly_type, AnomalyType::UnusualAmount);
        assert_eq!(drafts[0].description, "Your spending on Travel of ₹1200 looks unusual");
        assert_eq!(drafts[0].amount, dec("1200"));
        assert_eq!(drafts[0].category, "Unknown");
    }

    #[test]
    fn test_category_label() {
        assert_eq!(category_label("Category: Food, Amount: ₹5"), Some("Food".to_string()));
        assert_eq!(category_label("Category: Rent"), Some("Rent".to_string()));
        assert_eq!(category_label("Category: , Amount"), None);
        assert_eq!(category_label("no label"), None);
    }

    #[tokio::test]
    async fn test_no_transactions_short_circuits() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let user = Uuid::new_v4();

        // outside the 90-day window
        store
            .add_transaction(
                user,
                Transaction {
                    date: Utc::now().date_naive() - Duration::days(200),
                    category: Some("Food".to_string()),
                    amount: dec("100"),
                },
            )
            .await;

        let ctx = InsightContext::new(generator.clone(), store.clone(), InsightConfig::default());
        let anomalies = AnomalyService::new(ctx).detect(user).await.unwrap();

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].amount, zero_money());
        assert_eq!(anomalies[0].category, "General");
        assert_eq!(anomalies[0].description, NOT_ENOUGH_TRANSACTIONS);
        assert_eq!(generator.call_count(), 0);
        assert_eq!(store.list_anomalies(user, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detect_sends_window_and_persists() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let user = Uuid::new_v4();
        let today = Utc::now().date_naive();

        for (days_ago, amount) in [(1, "-250"), (10, "12500")] {
            store
                .add_transaction(
                    user,
                    Transaction {
                        date: today - Duration::days(days_ago),
                        category: Some("Travel".to_string()),
                        amount: dec(amount),
                    },
                )
                .await;
        }

        let generator = Arc::new(ScriptedGenerator::new(vec![
            "```json\n[{\"type\": \"unusual amount\", \"description\": \"Spike\", \"transaction\": \"Category: Travel, Amount: ₹12500\"}]\n```",
        ]));
        let ctx = InsightContext::new(generator.clone(), store.clone(), InsightConfig::default());
        let anomalies = AnomalyService::new(ctx).detect(user).await.unwrap();

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].amount, dec("12500"));
        assert_eq!(anomalies[0].category, "Travel");

        let prompts = generator.prompts().await;
        assert!(prompts[0].0.contains("Amount: ₹-250"));
        assert!(prompts[0].0.contains("Amount: ₹12500"));
    }
}
