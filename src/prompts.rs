//! Prompt builders
//!
//! Each prompt embeds the aggregated values, the exact JSON shape expected
//! back, and the currency marker the reply must use.

use crate::models::{AdviceType, ForecastType, MonthlyTotal, Transaction};
use bigdecimal::BigDecimal;

/// Aggregates fed into the advice prompt
#[derive(Debug, Clone, PartialEq)]
pub struct AdviceInputs {
    pub income: BigDecimal,
    pub expenses: BigDecimal,
    pub savings: BigDecimal,
    pub debt: BigDecimal,
}

impl Default for AdviceInputs {
    fn default() -> Self {
        Self {
            income: BigDecimal::from(0),
            expenses: BigDecimal::from(0),
            savings: BigDecimal::from(0),
            debt: BigDecimal::from(0),
        }
    }
}

fn advice_focus(advice_type: AdviceType) -> &'static str {
    match advice_type {
        AdviceType::Saving => "saving more of each month's income",
        AdviceType::Budget => "budgeting and keeping monthly expenses under control",
        AdviceType::Investment => "investing surplus money for long-term growth",
    }
}

pub fn advice_prompt(advice_type: AdviceType, inputs: &AdviceInputs, marker: &str) -> String {
    format!(
        r#"You are a financial advisor. Give personalized advice focused on {focus}.

USER DATA (current month):
Income: {m}{income}
Expenses: {m}{expenses}
Savings: {m}{savings}
Debt: {m}{debt}

Provide 3 actionable tips specific to this financial situation.

Respond ONLY with valid JSON, no introduction or conclusion:
{{ "tips": ["<tip 1>", "<tip 2>", "<tip 3>"] }}

Use {m} as the currency marker for every amount."#,
        focus = advice_focus(advice_type),
        m = marker,
        income = inputs.income,
        expenses = inputs.expenses,
        savings = inputs.savings,
        debt = inputs.debt,
    )
}

pub fn anomaly_prompt(transactions: &[Transaction], marker: &str) -> String {
    let lines = transactions
        .iter()
        .map(|t| {
            format!(
                "Date: {}, Category: {}, Amount: {}{}",
                t.date.format("%Y-%m-%d"),
                t.category_name(),
                marker,
                t.amount
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a financial anomaly detection system. Analyze these transactions:

{lines}

Identify unusual patterns. For each anomaly report:
- the anomaly type (unusual amount, unusual category or unusual frequency)
- why it is unusual
- the transaction involved, written as "Date: <date>, Category: <category>, Amount: {m}<amount>"

Respond ONLY with a JSON array, no extra text:
[{{ "type": "<type>", "description": "<why>", "transaction": "<transaction>" }}]

Return [] if nothing is unusual. Use {m} as the currency marker."#,
        lines = lines,
        m = marker,
    )
}

pub fn forecast_prompt(
    forecast_type: ForecastType,
    history: &[MonthlyTotal],
    horizon: usize,
    marker: &str,
) -> String {
    let lines = history
        .iter()
        .map(|point| {
            format!(
                "Date: {}, Amount: {}{}",
                point.month.format("%Y-%m-%d"),
                marker,
                point.amount
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a financial forecasting system. Historical monthly {kind} data:

{lines}

Forecast the next {horizon} months. For each month give the predicted amount
and a confidence score between 0.0 and 1.0, plus a brief explanation.

Respond ONLY with valid JSON, no extra text:
{{ "predictions": [{{ "month": 1, "amount": <number>, "confidence": <0.0-1.0> }}], "explanation": "<text>" }}

Amounts are plain numbers in {m}."#,
        kind = forecast_type.as_str().to_lowercase(),
        lines = lines,
        horizon = horizon,
        m = marker,
    )
}

pub fn calculator_prompt(query: &str, marker: &str, foreign_marker: &str) -> String {
    format!(
        r#"You are a financial calculator. Solve this query accurately and explain your reasoning:

{query}

Show step-by-step work. If the question involves loans, interest rates,
investments or taxes, add insights about the financial implications.

Respond ONLY with valid JSON, no markdown and no text before or after it:
{{ "result": "<direct answer>", "explanation": "<step-by-step explanation>", "insights": ["<insight>", "<insight>"] }}

IMPORTANT: use {m} as the currency, never {foreign}."#,
        query = query,
        m = marker,
        foreign = foreign_marker,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    #[test]
    fn test_advice_prompt_embeds_values() {
        let inputs = AdviceInputs {
            income: BigDecimal::from_str("5000.00").unwrap(),
            expenses: BigDecimal::from(3200),
            ..AdviceInputs::default()
        };
        let prompt = advice_prompt(AdviceType::Budget, &inputs, "₹");

        assert!(prompt.contains("Income: ₹5000.00"));
        assert!(prompt.contains("Expenses: ₹3200"));
        assert!(prompt.contains("Debt: ₹0"));
        assert!(prompt.contains("\"tips\""));
        assert!(prompt.contains("budgeting"));
    }

    #[test]
    fn test_anomaly_prompt_lists_transactions() {
        let transactions = vec![Transaction {
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            category: None,
            amount: BigDecimal::from(12500),
        }];
        let prompt = anomaly_prompt(&transactions, "₹");
        assert!(prompt.contains("Date: 2024-03-02, Category: Uncategorized, Amount: ₹12500"));
    }

    #[test]
    fn test_forecast_prompt_names_series() {
        let history = vec![MonthlyTotal {
            month: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            amount: BigDecimal::from(900),
        }];
        let prompt = forecast_prompt(ForecastType::Cashflow, &history, 3, "₹");
        assert!(prompt.contains("monthly cashflow data"));
        assert!(prompt.contains("next 3 months"));
        assert!(prompt.contains("\"predictions\""));
    }

    #[test]
    fn test_calculator_prompt() {
        let prompt = calculator_prompt("₹500 at 5% for 2 years", "₹", "$");
        assert!(prompt.contains("₹500 at 5% for 2 years"));
        assert!(prompt.contains("never $"));
    }
}
