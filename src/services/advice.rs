//! Personalized financial advice

use crate::extraction::{CurrencyNormalizer, ExtractedPayload, ResponseParser};
use crate::generator::is_failure_sentinel;
use crate::models::{AdviceType, FinancialAdvice, NewAdvice};
use crate::prompts::{advice_prompt, AdviceInputs};
use crate::services::{input_or_default, InsightContext};
use crate::Result;
use bigdecimal::BigDecimal;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

pub const INSUFFICIENT_DATA_ADVICE: &str = "Unable to generate personalized advice due to insufficient data. Please add more financial information to receive better recommendations.";

pub const ADVICE_UNAVAILABLE: &str =
    "Personalized advice is temporarily unavailable. Please try again later.";

pub struct AdviceService {
    ctx: InsightContext,
}

impl AdviceService {
    pub fn new(ctx: InsightContext) -> Self {
        Self { ctx }
    }

    pub async fn generate(&self, user_id: Uuid, advice_type: AdviceType) -> Result<FinancialAdvice> {
        let inputs = self.gather_inputs(user_id).await;
        let prompt = advice_prompt(advice_type, &inputs, self.ctx.marker());

        let reply = self
            .ctx
            .generator
            .generate(&prompt, self.ctx.config.limits.default_max_tokens)
            .await;

        let advice_text = advice_text_from_reply(&self.ctx.parser, &reply);
        let advice = self
            .ctx
            .store
            .create_advice(NewAdvice {
                user_id,
                advice_type,
                advice_text,
            })
            .await?;

        info!(user_id = %user_id, advice_type = %advice_type, "Advice generated");
        Ok(advice)
    }

    async fn gather_inputs(&self, user_id: Uuid) -> AdviceInputs {
        let store = &self.ctx.store;
        let today = self.ctx.today();

        let income: BigDecimal = input_or_default(store.sum_income(user_id, today).await, "income", user_id);
        let expenses: BigDecimal =
            input_or_default(store.sum_expenses(user_id, today).await, "expenses", user_id);
        let savings: Option<BigDecimal> =
            input_or_default(store.latest_balance(user_id).await, "balance", user_id);
        let debt: BigDecimal = input_or_default(store.total_debt(user_id).await, "debt", user_id);

        AdviceInputs {
            income,
            expenses,
            savings: savings.unwrap_or_else(|| BigDecimal::from(0)),
            debt: debt.abs(),
        }
    }
}

/// Placeholder stored when advice generation fails outright
pub fn fallback_advice(user_id: Uuid, advice_type: AdviceType) -> NewAdvice {
    NewAdvice {
        user_id,
        advice_type,
        advice_text: INSUFFICIENT_DATA_ADVICE.to_string(),
    }
}

/// Advice body for a raw reply: tips as `- tip` lines, else the whole reply
pub fn advice_text_from_reply(parser: &ResponseParser, reply: &str) -> String {
    if is_failure_sentinel(reply) {
        return ADVICE_UNAVAILABLE.to_string();
    }

    let text = match parser.parse(reply) {
        ExtractedPayload::Structured { value, .. } => {
            let tips = collect_tips(&value, parser.normalizer());
            if tips.is_empty() {
                parser.normalizer().normalize_str(reply.trim())
            } else {
                tips.iter()
                    .map(|tip| format!("- {}", tip))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ExtractedPayload::Degraded { note, .. } => note,
    };

    if text.trim().is_empty() {
        INSUFFICIENT_DATA_ADVICE.to_string()
    } else {
        text
    }
}

fn collect_tips(value: &Value, normalizer: &CurrencyNormalizer) -> Vec<String> {
    let items = match value {
        Value::Object(map) => match map.get("tips") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        Value::Array(items) => items.as_slice(),
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            // Keys are not normalized inside payloads
            other => Some(normalizer.normalize_str(&other.to_string())),
        })
        .filter(|tip| !tip.is_empty())
        .collect()
}
