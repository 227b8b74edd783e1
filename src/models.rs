//! Core data models for the insights engine

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::InsightError;
use crate::extraction::to_money;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviceType {
    Saving,
    Budget,
    Investment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    UnusualAmount,
    UnusualCategory,
    UnusualFrequency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastType {
    Income,
    Expense,
    Cashflow,
}

impl AdviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceType::Saving => "SAVING",
            AdviceType::Budget => "BUDGET",
            AdviceType::Investment => "INVESTMENT",
        }
    }

    pub fn from_db(value: &str) -> crate::Result<Self> {
        match value {
            "SAVING" => Ok(AdviceType::Saving),
            "BUDGET" => Ok(AdviceType::Budget),
            "INVESTMENT" => Ok(AdviceType::Investment),
            other => Err(InsightError::Database(format!("unknown advice type {}", other))),
        }
    }
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::UnusualAmount => "UNUSUAL_AMOUNT",
            AnomalyType::UnusualCategory => "UNUSUAL_CATEGORY",
            AnomalyType::UnusualFrequency => "UNUSUAL_FREQUENCY",
        }
    }

    pub fn from_db(value: &str) -> crate::Result<Self> {
        match value {
            "UNUSUAL_AMOUNT" => Ok(AnomalyType::UnusualAmount),
            "UNUSUAL_CATEGORY" => Ok(AnomalyType::UnusualCategory),
            "UNUSUAL_FREQUENCY" => Ok(AnomalyType::UnusualFrequency),
            other => Err(InsightError::Database(format!("unknown anomaly type {}", other))),
        }
    }

    /// Map the free-text type reported by the model
    pub fn classify(reported: &str) -> Self {
        let lowered = reported.to_lowercase();
        if lowered.contains("category") {
            AnomalyType::UnusualCategory
        } else if lowered.contains("frequency") {
            AnomalyType::UnusualFrequency
        } else {
            AnomalyType::UnusualAmount
        }
    }
}

impl ForecastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastType::Income => "INCOME",
            ForecastType::Expense => "EXPENSE",
            ForecastType::Cashflow => "CASHFLOW",
        }
    }

    pub fn from_db(value: &str) -> crate::Result<Self> {
        match value {
            "INCOME" => Ok(ForecastType::Income),
            "EXPENSE" => Ok(ForecastType::Expense),
            "CASHFLOW" => Ok(ForecastType::Cashflow),
            other => Err(InsightError::Database(format!("unknown forecast type {}", other))),
        }
    }
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ForecastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence scores are kept inside `[0, 1]`; NaN becomes the neutral 0.5
pub fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() {
        0.5
    } else {
        score.clamp(0.0, 1.0)
    }
}

//
// ================= Inputs =================
//

/// A ledger entry as seen by the anomaly scan. Negative amounts are debts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub category: Option<String>,
    pub amount: BigDecimal,
}

impl Transaction {
    pub fn category_name(&self) -> &str {
        self.category.as_deref().unwrap_or("Uncategorized")
    }
}

/// Sum for one calendar month, keyed by the first day of that month
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyTotal {
    pub month: NaiveDate,
    pub amount: BigDecimal,
}

//
// ================= Advice =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialAdvice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub advice_type: AdviceType,
    pub advice_text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAdvice {
    pub user_id: Uuid,
    pub advice_type: AdviceType,
    pub advice_text: String,
}

impl NewAdvice {
    pub fn into_record(self) -> FinancialAdvice {
        FinancialAdvice {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            advice_type: self.advice_type,
            advice_text: self.advice_text,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

//
// ================= Anomaly =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseAnomaly {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub category: String,
    pub anomaly_type: AnomalyType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnomaly {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub category: String,
    pub anomaly_type: AnomalyType,
    pub description: String,
}

impl NewAnomaly {
    pub fn into_record(self) -> ExpenseAnomaly {
        ExpenseAnomaly {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            amount: to_money(self.amount),
            category: self.category,
            anomaly_type: self.anomaly_type,
            description: self.description,
            created_at: Utc::now(),
        }
    }
}

//
// ================= Forecast =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialForecast {
    pub id: Uuid,
    pub user_id: Uuid,
    pub forecast_type: ForecastType,
    pub forecast_date: NaiveDate,
    pub predicted_amount: BigDecimal,
    pub confidence_score: f64,
    #[serde(default)]
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewForecast {
    pub user_id: Uuid,
    pub forecast_type: ForecastType,
    pub forecast_date: NaiveDate,
    pub predicted_amount: BigDecimal,
    pub confidence_score: f64,
    pub explanation: Option<String>,
}

impl NewForecast {
    pub fn into_record(self) -> FinancialForecast {
        FinancialForecast {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            forecast_type: self.forecast_type,
            forecast_date: self.forecast_date,
            predicted_amount: to_money(self.predicted_amount),
            confidence_score: clamp_confidence(self.confidence_score),
            explanation: self.explanation,
            created_at: Utc::now(),
        }
    }
}

//
// ================= Calculation =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialCalculation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub query: String,
    pub result: String,
    pub explanation: String,
    pub insights: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    pub user_id: Uuid,
    pub query: String,
    pub result: String,
    pub explanation: String,
    pub insights: Vec<String>,
}

impl NewCalculation {
    pub fn into_record(self) -> FinancialCalculation {
        FinancialCalculation {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            query: self.query,
            result: self.result,
            explanation: self.explanation,
            insights: self.insights,
            created_at: Utc::now(),
        }
    }
}

/// What a calculator caller gets back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub calculation_id: Uuid,
    pub result: String,
    pub explanation: String,
    pub insights: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FinancialCalculation> for CalculationResult {
    fn from(calculation: FinancialCalculation) -> Self {
        Self {
            calculation_id: calculation.id,
            result: calculation.result,
            explanation: calculation.explanation,
            insights: calculation.insights,
            created_at: calculation.created_at,
        }
    }
}

//
// ================= Read side =================
//

/// Latest records per kind, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dashboard {
    pub advice: Vec<FinancialAdvice>,
    pub anomalies: Vec<ExpenseAnomaly>,
    pub forecasts: Vec<FinancialForecast>,
}
