//! Income, expense and cashflow forecasting

use crate::config::ServiceLimits;
use crate::extraction::{amount_from_value, zero_money, ExtractedPayload, ResponseParser};
use crate::generator::is_failure_sentinel;
use crate::models::{FinancialForecast, ForecastType, MonthlyTotal, NewForecast};
use crate::prompts::forecast_prompt;
use crate::services::{input_or_default, InsightContext};
use crate::Result;
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_CONFIDENCE: f64 = 0.5;

pub const FORECAST_UNAVAILABLE: &str =
    "Forecasting is temporarily unavailable. Please try again later.";

/// Which placeholder set to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// Not enough history to forecast from
    InsufficientData,
    /// Forecasting failed unexpectedly
    Failure,
}

impl PlaceholderReason {
    fn confidences(&self) -> [f64; 3] {
        match self {
            PlaceholderReason::InsufficientData => [0.6, 0.7, 0.5],
            PlaceholderReason::Failure => [0.5, 0.5, 0.5],
        }
    }
}

pub struct ForecastService {
    ctx: InsightContext,
}

impl ForecastService {
    pub fn new(ctx: InsightContext) -> Self {
        Self { ctx }
    }

    pub async fn forecast(&self, user_id: Uuid) -> Result<Vec<FinancialForecast>> {
        let limits = &self.ctx.config.limits;
        let today = self.ctx.today();
        let start = today - Duration::days(limits.forecast_window_days);

        let expenses = input_or_default(
            self.ctx.store.monthly_expenses(user_id, start, today).await,
            "monthly expenses",
            user_id,
        );

        if expenses.len() < limits.forecast_min_points {
            debug!(
                user_id = %user_id,
                points = expenses.len(),
                "Not enough expense history; writing placeholder forecasts"
            );
            let mut forecasts = Vec::with_capacity(3);
            for draft in placeholder_forecasts(user_id, today, limits, PlaceholderReason::InsufficientData) {
                forecasts.push(self.ctx.store.create_forecast(draft).await?);
            }
            return Ok(forecasts);
        }

        let mut forecasts = self
            .forecast_series(user_id, ForecastType::Expense, &expenses, today)
            .await?;

        let income = input_or_default(
            self.ctx.store.monthly_income(user_id, start, today).await,
            "monthly income",
            user_id,
        );

        if income.len() >= limits.forecast_min_points {
            forecasts.extend(
                self.forecast_series(user_id, ForecastType::Income, &income, today)
                    .await?,
            );

            let cashflow = derive_cashflow(&income, &expenses);
            forecasts.extend(
                self.forecast_series(user_id, ForecastType::Cashflow, &cashflow, today)
                    .await?,
            );
        }

        info!(user_id = %user_id, forecasts = forecasts.len(), "Forecasts generated");
        Ok(forecasts)
    }

    async fn forecast_series(
        &self,
        user_id: Uuid,
        forecast_type: ForecastType,
        history: &[MonthlyTotal],
        today: NaiveDate,
    ) -> Result<Vec<FinancialForecast>> {
        let limits = &self.ctx.config.limits;
        let prompt = forecast_prompt(
            forecast_type,
            history,
            limits.forecast_max_predictions,
            self.ctx.marker(),
        );

        let reply = self
            .ctx
            .generator
            .generate(&prompt, limits.default_max_tokens)
            .await;

        let drafts = forecasts_from_reply(&self.ctx.parser, user_id, forecast_type, &reply, today, limits);
        let mut forecasts = Vec::with_capacity(drafts.len());
        for draft in drafts {
            forecasts.push(self.ctx.store.create_forecast(draft).await?);
        }
        Ok(forecasts)
    }
}

/// EXPENSE 3000, INCOME 5000, CASHFLOW 2000, one step ahead
pub fn placeholder_forecasts(
    user_id: Uuid,
    today: NaiveDate,
    limits: &ServiceLimits,
    reason: PlaceholderReason,
) -> Vec<NewForecast> {
    let date = today + Duration::days(limits.forecast_step_days);
    [
        (ForecastType::Expense, 3000),
        (ForecastType::Income, 5000),
        (ForecastType::Cashflow, 2000),
    ]
    .into_iter()
    .zip(reason.confidences())
    .map(|((forecast_type, amount), confidence_score)| NewForecast {
        user_id,
        forecast_type,
        forecast_date: date,
        predicted_amount: BigDecimal::from(amount),
        confidence_score,
        explanation: None,
    })
    .collect()
}

/// Income minus expenses over the union of months; a missing side counts as 0
pub fn derive_cashflow(income: &[MonthlyTotal], expenses: &[MonthlyTotal]) -> Vec<MonthlyTotal> {
    let mut by_month: BTreeMap<NaiveDate, BigDecimal> = BTreeMap::new();

    for point in income {
        *by_month
            .entry(point.month)
            .or_insert_with(|| BigDecimal::from(0)) += point.amount.clone();
    }
    for point in expenses {
        *by_month
            .entry(point.month)
            .or_insert_with(|| BigDecimal::from(0)) -= point.amount.clone();
    }

    by_month
        .into_iter()
        .map(|(month, amount)| MonthlyTotal { month, amount })
        .collect()
}

/// Map a raw reply onto forecast drafts. Never returns an empty list.
pub fn forecasts_from_reply(
    parser: &ResponseParser,
    user_id: Uuid,
    forecast_type: ForecastType,
    reply: &str,
    today: NaiveDate,
    limits: &ServiceLimits,
) -> Vec<NewForecast> {
    let (predictions, explanation) = if is_failure_sentinel(reply) {
        (Vec::new(), Some(FORECAST_UNAVAILABLE.to_string()))
    } else {
        match parser.parse(reply) {
            ExtractedPayload::Structured { value, .. } => {
                let explanation = value
                    .get("explanation")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (prediction_entries(&value), explanation)
            }
            ExtractedPayload::Degraded { note, .. } => (Vec::new(), Some(note)),
        }
    };

    let mut parsed: Vec<(BigDecimal, f64)> = predictions
        .iter()
        .take(limits.forecast_max_predictions)
        .map(|prediction| {
            let amount = prediction
                .get("amount")
                .and_then(amount_from_value)
                .unwrap_or_else(zero_money);
            let confidence = prediction
                .get("confidence")
                .and_then(confidence_from_value)
                .unwrap_or(DEFAULT_CONFIDENCE);
            (amount, confidence)
        })
        .collect();

    if parsed.is_empty() {
        parsed.push((zero_money(), DEFAULT_CONFIDENCE));
    }

    parsed
        .into_iter()
        .enumerate()
        .map(|(i, (predicted_amount, confidence_score))| NewForecast {
            user_id,
            forecast_type,
            forecast_date: today + Duration::days(limits.forecast_step_days * (i as i64 + 1)),
            predicted_amount,
            confidence_score,
            explanation: explanation.clone().filter(|e| !e.trim().is_empty()),
        })
        .collect()
}

fn prediction_entries(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(map) => match map.get("predictions") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// Fractions pass through. "75%" is always a percentage; a bare number in
/// (1, 100] is read as one too, whether it arrived as a string or a number.
fn confidence_from_value(value: &Value) -> Option<f64> {
    let (raw, percent) = match value {
        Value::Number(n) => (n.as_f64()?, false),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_suffix('%');
            (f64::from_str(digits.unwrap_or(s).trim()).ok()?, digits.is_some())
        }
        _ => return None,
    };
    if percent || (raw > 1.0 && raw <= 100.0) {
        Some(raw / 100.0)
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsightConfig;
    use crate::generator::{ScriptedGenerator, UNABLE_TO_GENERATE};
    use crate::store::{month_start, FinanceStore, InMemoryFinanceStore};
    use chrono::{Months, Utc};
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn total(month: NaiveDate, amount: &str) -> MonthlyTotal {
        MonthlyTotal {
            month,
            amount: dec(amount),
        }
    }

    #[test]
    fn test_predictions_are_dated_and_capped() {
        let today = day(2024, 1, 10);
        let reply = r#"{"predictions": [
            {"month": 1, "amount": 3100.5, "confidence": 0.8},
            {"month": 2, "amount": "₹3,200", "confidence": "75%"},
            {"month": 3, "amount": 3300},
            {"month": 4, "amount": 3400, "confidence": 0.9}
        ], "explanation": "Rising by $100 a month"}"#;

        let drafts = forecasts_from_reply(
            &ResponseParser::default(),
            Uuid::new_v4(),
            ForecastType::Expense,
            reply,
            today,
            &ServiceLimits::default(),
        );

        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].forecast_date, day(2024, 2, 9));
        assert_eq!(drafts[1].forecast_date, day(2024, 3, 10));
        assert_eq!(drafts[2].forecast_date, day(2024, 4, 9));
        assert_eq!(drafts[0].predicted_amount, dec("3100.5"));
        assert_eq!(drafts[1].predicted_amount, dec("3200"));
        assert_eq!(drafts[1].confidence_score, 0.75);
        assert_eq!(drafts[2].confidence_score, 0.5);
        assert_eq!(drafts[0].explanation.as_deref(), Some("Rising by ₹100 a month"));
    }

    #[test]
    fn test_percent_confidence_same_for_numbers_and_strings() {
        use serde_json::json;

        let close = |value: Value, expected: f64| {
            let got = confidence_from_value(&value).unwrap();
            assert!((got - expected).abs() < 1e-9, "{} gave {}", value, got);
        };
        close(json!(85), 0.85);
        close(json!("85"), 0.85);
        close(json!("85%"), 0.85);
        close(json!(0.8), 0.8);
        close(json!("0.8"), 0.8);
        close(json!(1), 1.0);
        close(json!(250), 250.0);
        assert_eq!(confidence_from_value(&json!("high")), None);
        assert_eq!(confidence_from_value(&json!(null)), None);
    }

    #[test]
    fn test_unparseable_reply_gives_single_zero_prediction() {
        let today = day(2024, 6, 1);
        let drafts = forecasts_from_reply(
            &ResponseParser::default(),
            Uuid::new_v4(),
            ForecastType::Income,
            "Income will likely stay flat.",
            today,
            &ServiceLimits::default(),
        );

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].predicted_amount, zero_money());
        assert_eq!(drafts[0].confidence_score, 0.5);
        assert_eq!(drafts[0].explanation.as_deref(), Some("Income will likely stay flat."));

        let drafts = forecasts_from_reply(
            &ResponseParser::default(),
            Uuid::new_v4(),
            ForecastType::Income,
            UNABLE_TO_GENERATE,
            today,
            &ServiceLimits::default(),
        );
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].explanation.as_deref(), Some(FORECAST_UNAVAILABLE));
    }

    #[test]
    fn test_cashflow_over_union_of_months() {
        let income = vec![
            total(day(2024, 1, 1), "5000"),
            total(day(2024, 2, 1), "5000"),
            total(day(2024, 4, 1), "6000"),
        ];
        let expenses = vec![
            total(day(2024, 1, 1), "3000"),
            total(day(2024, 3, 1), "1000"),
            total(day(2024, 4, 1), "6500"),
        ];

        let cashflow = derive_cashflow(&income, &expenses);
        let amounts: Vec<String> = cashflow.iter().map(|p| p.amount.to_string()).collect();
        let months: Vec<NaiveDate> = cashflow.iter().map(|p| p.month).collect();

        assert_eq!(months, vec![day(2024, 1, 1), day(2024, 2, 1), day(2024, 3, 1), day(2024, 4, 1)]);
        assert_eq!(amounts, vec!["2000", "5000", "-1000", "-500"]);
    }

    #[tokio::test]
    async fn test_short_history_writes_three_placeholders() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let user = Uuid::new_v4();
        let today = Utc::now().date_naive();
        store.add_expense(user, today, dec("500")).await;

        let ctx = InsightContext::new(generator.clone(), store.clone(), InsightConfig::default());
        let forecasts = ForecastService::new(ctx).forecast(user).await.unwrap();

        let kinds: Vec<ForecastType> = forecasts.iter().map(|f| f.forecast_type).collect();
        assert_eq!(kinds, vec![ForecastType::Expense, ForecastType::Income, ForecastType::Cashflow]);
        assert_eq!(forecasts[0].predicted_amount, dec("3000"));
        assert_eq!(forecasts[0].confidence_score, 0.6);
        assert_eq!(forecasts[1].confidence_score, 0.7);
        assert_eq!(forecasts[2].confidence_score, 0.5);
        assert!(forecasts.iter().all(|f| f.forecast_date == today + Duration::days(30)));
        assert_eq!(generator.call_count(), 0);
        assert_eq!(store.list_forecasts(user, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_history_forecasts_all_series() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let user = Uuid::new_v4();
        let this_month = month_start(Utc::now().date_naive());

        for back in 1..=3 {
            let month = this_month - Months::new(back);
            store.add_expense(user, month, dec("3000")).await;
            store.add_income(user, month, dec("5000")).await;
        }

        let reply = r#"{"predictions": [{"amount": 1, "confidence": 0.9}, {"amount": 2, "confidence": 0.8}], "explanation": "steady"}"#;
        let generator = Arc::new(ScriptedGenerator::repeating(reply));
        let ctx = InsightContext::new(generator.clone(), store.clone(), InsightConfig::default());

        let forecasts = ForecastService::new(ctx).forecast(user).await.unwrap();

        assert_eq!(generator.call_count(), 3);
        assert_eq!(forecasts.len(), 6);
        assert_eq!(forecasts[0].forecast_type, ForecastType::Expense);
        assert_eq!(forecasts[2].forecast_type, ForecastType::Income);
        assert_eq!(forecasts[4].forecast_type, ForecastType::Cashflow);

        let prompts = generator.prompts().await;
        assert!(prompts[2].0.contains("monthly cashflow data"));
        assert!(prompts[2].0.contains("Amount: ₹2000"));
    }
}
