//! Postgres-backed finance store
//!
//! Queries are built at runtime (no compile-time checked macros). The schema
//! is created lazily on first use and only once per store.

use crate::error::InsightError;
use crate::models::{
    AdviceType, AnomalyType, ExpenseAnomaly, FinancialAdvice, FinancialCalculation,
    FinancialForecast, ForecastType, MonthlyTotal, NewAdvice, NewAnomaly, NewCalculation,
    NewForecast, Transaction,
};
use crate::store::{month_start, FinanceStore};
use crate::Result;
use bigdecimal::BigDecimal;
use chrono::{Months, NaiveDate};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS incomes (
      id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL,
      date DATE NOT NULL,
      value NUMERIC(12, 2) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
      id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL,
      date DATE NOT NULL,
      value NUMERIC(12, 2) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balances (
      id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL,
      date DATE NOT NULL,
      value NUMERIC(12, 2) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
      id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL,
      date DATE NOT NULL,
      category TEXT,
      amount NUMERIC(12, 2) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS financial_advice (
      id UUID PRIMARY KEY,
      user_id UUID NOT NULL,
      advice_type TEXT NOT NULL,
      advice_text TEXT NOT NULL,
      is_read BOOLEAN NOT NULL DEFAULT FALSE,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expense_anomalies (
      id UUID PRIMARY KEY,
      user_id UUID NOT NULL,
      amount NUMERIC(12, 2) NOT NULL,
      category TEXT NOT NULL,
      anomaly_type TEXT NOT NULL,
      description TEXT NOT NULL,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS financial_forecasts (
      id UUID PRIMARY KEY,
      user_id UUID NOT NULL,
      forecast_type TEXT NOT NULL,
      forecast_date DATE NOT NULL,
      predicted_amount NUMERIC(12, 2) NOT NULL,
      confidence_score DOUBLE PRECISION NOT NULL,
      explanation TEXT,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS financial_calculations (
      id UUID PRIMARY KEY,
      user_id UUID NOT NULL,
      query TEXT NOT NULL,
      result TEXT NOT NULL,
      explanation TEXT NOT NULL,
      insights TEXT NOT NULL,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Tables holding plain dated values
#[derive(Debug, Clone, Copy)]
enum ValueTable {
    Incomes,
    Expenses,
}

impl ValueTable {
    fn name(&self) -> &'static str {
        match self {
            ValueTable::Incomes => "incomes",
            ValueTable::Expenses => "expenses",
        }
    }
}

pub struct PgFinanceStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgFinanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Lazily connecting pool; nothing touches the network until first use
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;
        info!("Finance store backend: postgres");
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                InsightError::Database(format!("Failed to initialize finance schema: {}", e))
            })?;

        Ok(())
    }

    async fn sum_month(&self, table: ValueTable, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal> {
        self.ensure_schema().await?;

        let start = month_start(month);
        let end = next_month(start)?;
        let sql = format!(
            "SELECT COALESCE(SUM(value), 0) AS total FROM {} WHERE user_id = $1 AND date >= $2 AND date < $3",
            table.name()
        );

        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("total")?)
    }

    async fn monthly(
        &self,
        table: ValueTable,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>> {
        self.ensure_schema().await?;

        let sql = format!(
            "SELECT date_trunc('month', date)::date AS month, SUM(value) AS total \
             FROM {} WHERE user_id = $1 AND date >= $2 AND date <= $3 \
             GROUP BY 1 ORDER BY 1",
            table.name()
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(MonthlyTotal {
                    month: row.try_get("month")?,
                    amount: row.try_get("total")?,
                })
            })
            .collect()
    }
}

fn next_month(start: NaiveDate) -> Result<NaiveDate> {
    start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| InsightError::Database(format!("date out of range: {}", start)))
}

fn advice_from_row(row: &PgRow) -> Result<FinancialAdvice> {
    let advice_type: String = row.try_get("advice_type")?;
    Ok(FinancialAdvice {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        advice_type: AdviceType::from_db(&advice_type)?,
        advice_text: row.try_get("advice_text")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

fn anomaly_from_row(row: &PgRow) -> Result<ExpenseAnomaly> {
    let anomaly_type: String = row.try_get("anomaly_type")?;
    Ok(ExpenseAnomaly {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        category: row.try_get("category")?,
        anomaly_type: AnomalyType::from_db(&anomaly_type)?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn forecast_from_row(row: &PgRow) -> Result<FinancialForecast> {
    let forecast_type: String = row.try_get("forecast_type")?;
    Ok(FinancialForecast {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        forecast_type: ForecastType::from_db(&forecast_type)?,
        forecast_date: row.try_get("forecast_date")?,
        predicted_amount: row.try_get("predicted_amount")?,
        confidence_score: row.try_get("confidence_score")?,
        explanation: row.try_get("explanation")?,
        created_at: row.try_get("created_at")?,
    })
}

fn calculation_from_row(row: &PgRow) -> Result<FinancialCalculation> {
    let insights: String = row.try_get("insights")?;
    Ok(FinancialCalculation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        query: row.try_get("query")?,
        result: row.try_get("result")?,
        explanation: row.try_get("explanation")?,
        insights: serde_json::from_str(&insights)?,
        created_at: row.try_get("created_at")?,
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl FinanceStore for PgFinanceStore {
    async fn sum_income(&self, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal> {
        self.sum_month(ValueTable::Incomes, user_id, month).await
    }

    async fn sum_expenses(&self, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal> {
        self.sum_month(ValueTable::Expenses, user_id, month).await
    }

    async fn latest_balance(&self, user_id: Uuid) -> Result<Option<BigDecimal>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT value FROM balances WHERE user_id = $1 ORDER BY date DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn total_debt(&self, user_id: Uuid) -> Result<BigDecimal> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT COALESCE(ABS(SUM(amount)), 0) AS debt FROM transactions WHERE user_id = $1 AND amount < 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("debt")?)
    }

    async fn recent_transactions(
        &self,
        user_id: Uuid,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT date, category, amount
            FROM transactions
            WHERE user_id = $1 AND date >= $2
            ORDER BY date DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Transaction {
                    date: row.try_get("date")?,
                    category: row.try_get("category")?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect()
    }

    async fn monthly_income(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>> {
        self.monthly(ValueTable::Incomes, user_id, start, end).await
    }

    async fn monthly_expenses(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>> {
        self.monthly(ValueTable::Expenses, user_id, start, end).await
    }

    async fn create_advice(&self, draft: NewAdvice) -> Result<FinancialAdvice> {
        self.ensure_schema().await?;
        let record = draft.into_record();

        sqlx::query(
            r#"
            INSERT INTO financial_advice (id, user_id, advice_type, advice_text, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.advice_type.as_str())
        .bind(&record.advice_text)
        .bind(record.is_read)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create_anomaly(&self, draft: NewAnomaly) -> Result<ExpenseAnomaly> {
        self.ensure_schema().await?;
        let record = draft.into_record();

        sqlx::query(
            r#"
            INSERT INTO expense_anomalies (id, user_id, amount, category, anomaly_type, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.amount)
        .bind(&record.category)
        .bind(record.anomaly_type.as_str())
        .bind(&record.description)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create_forecast(&self, draft: NewForecast) -> Result<FinancialForecast> {
        self.ensure_schema().await?;
        let record = draft.into_record();

        sqlx::query(
            r#"
            INSERT INTO financial_forecasts
              (id, user_id, forecast_type, forecast_date, predicted_amount, confidence_score, explanation, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.forecast_type.as_str())
        .bind(record.forecast_date)
        .bind(&record.predicted_amount)
        .bind(record.confidence_score)
        .bind(&record.explanation)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create_calculation(&self, draft: NewCalculation) -> Result<FinancialCalculation> {
        self.ensure_schema().await?;
        let record = draft.into_record();
        let insights = serde_json::to_string(&record.insights)?;

        sqlx::query(
            r#"
            INSERT INTO financial_calculations (id, user_id, query, result, explanation, insights, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.query)
        .bind(&record.result)
        .bind(&record.explanation)
        .bind(insights)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_advice(&self, user_id: Uuid, limit: usize) -> Result<Vec<FinancialAdvice>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM financial_advice WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(advice_from_row).collect()
    }

    async fn list_anomalies(&self, user_id: Uuid, limit: usize) -> Result<Vec<ExpenseAnomaly>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM expense_anomalies WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(anomaly_from_row).collect()
    }

    async fn list_forecasts(&self, user_id: Uuid, limit: usize) -> Result<Vec<FinancialForecast>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM financial_forecasts WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(forecast_from_row).collect()
    }

    async fn list_calculations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<FinancialCalculation>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM financial_calculations WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(calculation_from_row).collect()
    }
}
