//! Finance data persistence layer
//!
//! Services read aggregated inputs and write insight records through the
//! `FinanceStore` trait. The in-memory store backs tests and offline runs;
//! `PgFinanceStore` is the Postgres implementation.

use crate::models::{
    ExpenseAnomaly, FinancialAdvice, FinancialCalculation, FinancialForecast, MonthlyTotal,
    NewAdvice, NewAnomaly, NewCalculation, NewForecast, Transaction,
};
use crate::Result;
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod postgres;
pub use postgres::PgFinanceStore;

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Trait for finance data persistence
#[async_trait::async_trait]
pub trait FinanceStore: Send + Sync {
    /// Income recorded in the month containing `month`
    async fn sum_income(&self, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal>;
    /// Expenses recorded in the month containing `month`
    async fn sum_expenses(&self, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal>;
    async fn latest_balance(&self, user_id: Uuid) -> Result<Option<BigDecimal>>;
    /// Absolute value of the sum of negative transactions
    async fn total_debt(&self, user_id: Uuid) -> Result<BigDecimal>;
    /// Transactions dated on or after `since`, newest first
    async fn recent_transactions(
        &self,
        user_id: Uuid,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Transaction>>;
    /// Monthly income sums within `[start, end]`, oldest month first
    async fn monthly_income(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>>;
    async fn monthly_expenses(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>>;

    async fn create_advice(&self, draft: NewAdvice) -> Result<FinancialAdvice>;
    async fn create_anomaly(&self, draft: NewAnomaly) -> Result<ExpenseAnomaly>;
    async fn create_forecast(&self, draft: NewForecast) -> Result<FinancialForecast>;
    async fn create_calculation(&self, draft: NewCalculation) -> Result<FinancialCalculation>;

    // Listings are newest first
    async fn list_advice(&self, user_id: Uuid, limit: usize) -> Result<Vec<FinancialAdvice>>;
    async fn list_anomalies(&self, user_id: Uuid, limit: usize) -> Result<Vec<ExpenseAnomaly>>;
    async fn list_forecasts(&self, user_id: Uuid, limit: usize) -> Result<Vec<FinancialForecast>>;
    async fn list_calculations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<FinancialCalculation>>;
}

type Entries = Arc<RwLock<HashMap<Uuid, Vec<(NaiveDate, BigDecimal)>>>>;
type Records<T> = Arc<RwLock<HashMap<Uuid, Vec<T>>>>;

/// In-memory finance store for development and tests
pub struct InMemoryFinanceStore {
    incomes: Entries,
    expenses: Entries,
    balances: Entries,
    transactions: Records<Transaction>,
    advice: Records<FinancialAdvice>,
    anomalies: Records<ExpenseAnomaly>,
    forecasts: Records<FinancialForecast>,
    calculations: Records<FinancialCalculation>,
}

impl InMemoryFinanceStore {
    pub fn new() -> Self {
        Self {
            incomes: Arc::new(RwLock::new(HashMap::new())),
            expenses: Arc::new(RwLock::new(HashMap::new())),
            balances: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            advice: Arc::new(RwLock::new(HashMap::new())),
            anomalies: Arc::new(RwLock::new(HashMap::new())),
            forecasts: Arc::new(RwLock::new(HashMap::new())),
            calculations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add_income(&self, user_id: Uuid, date: NaiveDate, value: BigDecimal) {
        push_entry(&self.incomes, user_id, date, value).await;
    }

    pub async fn add_expense(&self, user_id: Uuid, date: NaiveDate, value: BigDecimal) {
        push_entry(&self.expenses, user_id, date, value).await;
    }

    pub async fn add_balance(&self, user_id: Uuid, date: NaiveDate, value: BigDecimal) {
        push_entry(&self.balances, user_id, date, value).await;
    }

    pub async fn add_transaction(&self, user_id: Uuid, transaction: Transaction) {
        self.transactions
            .write()
            .await
            .entry(user_id)
            .or_insert_with(Vec::new)
            .push(transaction);
    }
}

impl Default for InMemoryFinanceStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn push_entry(entries: &Entries, user_id: Uuid, date: NaiveDate, value: BigDecimal) {
    entries
        .write()
        .await
        .entry(user_id)
        .or_insert_with(Vec::new)
        .push((date, value));
}

async fn sum_in_month(entries: &Entries, user_id: Uuid, month: NaiveDate) -> BigDecimal {
    let month = month_start(month);
    let entries = entries.read().await;
    entries
        .get(&user_id)
        .map(|items| {
            items
                .iter()
                .filter(|(date, _)| month_start(*date) == month)
                .map(|(_, value)| value.clone())
                .sum::<BigDecimal>()
        })
        .unwrap_or_else(|| BigDecimal::from(0))
}

async fn monthly_sums(
    entries: &Entries,
    user_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<MonthlyTotal> {
    let entries = entries.read().await;
    let mut by_month: BTreeMap<NaiveDate, BigDecimal> = BTreeMap::new();

    if let Some(items) = entries.get(&user_id) {
        for (date, value) in items.iter().filter(|(date, _)| *date >= start && *date <= end) {
            *by_month
                .entry(month_start(*date))
                .or_insert_with(|| BigDecimal::from(0)) += value.clone();
        }
    }

    by_month
        .into_iter()
        .map(|(month, amount)| MonthlyTotal { month, amount })
        .collect()
}

async fn push_record<T: Clone>(records: &Records<T>, user_id: Uuid, record: T) -> T {
    records
        .write()
        .await
        .entry(user_id)
        .or_insert_with(Vec::new)
        .push(record.clone());
    record
}

async fn latest_records<T: Clone>(records: &Records<T>, user_id: Uuid, limit: usize) -> Vec<T> {
    records
        .read()
        .await
        .get(&user_id)
        .map(|items| items.iter().rev().take(limit).cloned().collect())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl FinanceStore for InMemoryFinanceStore {
    async fn sum_income(&self, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal> {
        Ok(sum_in_month(&self.incomes, user_id, month).await)
    }

    async fn sum_expenses(&self, user_id: Uuid, month: NaiveDate) -> Result<BigDecimal> {
        Ok(sum_in_month(&self.expenses, user_id, month).await)
    }

    async fn latest_balance(&self, user_id: Uuid) -> Result<Option<BigDecimal>> {
        let balances = self.balances.read().await;
        Ok(balances.get(&user_id).and_then(|items| {
            items
                .iter()
                .max_by_key(|(date, _)| *date)
                .map(|(_, value)| value.clone())
        }))
    }

    async fn total_debt(&self, user_id: Uuid) -> Result<BigDecimal> {
        let zero = BigDecimal::from(0);
        let transactions = self.transactions.read().await;
        let negative: BigDecimal = transactions
            .get(&user_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|t| t.amount < zero)
                    .map(|t| t.amount.clone())
                    .sum::<BigDecimal>()
            })
            .unwrap_or_else(|| zero.clone());
        Ok(negative.abs())
    }

    async fn recent_transactions(
        &self,
        user_id: Uuid,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut recent: Vec<Transaction> = transactions
            .get(&user_id)
            .map(|items| items.iter().filter(|t| t.date >= since).cloned().collect())
            .unwrap_or_default();

        recent.sort_by(|a, b| b.date.cmp(&a.date));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn monthly_income(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>> {
        Ok(monthly_sums(&self.incomes, user_id, start, end).await)
    }

    async fn monthly_expenses(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MonthlyTotal>> {
        Ok(monthly_sums(&self.expenses, user_id, start, end).await)
    }

    async fn create_advice(&self, draft: NewAdvice) -> Result<FinancialAdvice> {
        let record = draft.into_record();
        Ok(push_record(&self.advice, record.user_id, record).await)
    }

    async fn create_anomaly(&self, draft: NewAnomaly) -> Result<ExpenseAnomaly> {
        let record = draft.into_record();
        Ok(push_record(&self.anomalies, record.user_id, record).await)
    }

    async fn create_forecast(&self, draft: NewForecast) -> Result<FinancialForecast> {
        let record = draft.into_record();
        Ok(push_record(&self.forecasts, record.user_id, record).await)
    }

    async fn create_calculation(&self, draft: NewCalculation) -> Result<FinancialCalculation> {
        let record = draft.into_record();
        Ok(push_record(&self.calculations, record.user_id, record).await)
    }

    async fn list_advice(&self, user_id: Uuid, limit: usize) -> Result<Vec<FinancialAdvice>> {
        Ok(latest_records(&self.advice, user_id, limit).await)
    }

    async fn list_anomalies(&self, user_id: Uuid, limit: usize) -> Result<Vec<ExpenseAnomaly>> {
        Ok(latest_records(&self.anomalies, user_id, limit).await)
    }

    async fn list_forecasts(&self, user_id: Uuid, limit: usize) -> Result<Vec<FinancialForecast>> {
        Ok(latest_records(&self.forecasts, user_id, limit).await)
    }

    async fn list_calculations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<FinancialCalculation>> {
        Ok(latest_records(&self.calculations, user_id, limit).await)
    }
}

/// Store double whose every call fails
#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
#[async_trait::async_trait]
impl FinanceStore for FailingStore {
    async fn sum_income(&self, _: Uuid, _: NaiveDate) -> Result<BigDecimal> {
        Err(unavailable())
    }

    async fn sum_expenses(&self, _: Uuid, _: NaiveDate) -> Result<BigDecimal> {
        Err(unavailable())
    }

    async fn latest_balance(&self, _: Uuid) -> Result<Option<BigDecimal>> {
        Err(unavailable())
    }

    async fn total_debt(&self, _: Uuid) -> Result<BigDecimal> {
        Err(unavailable())
    }

    async fn recent_transactions(&self, _: Uuid, _: NaiveDate, _: usize) -> Result<Vec<Transaction>> {
        Err(unavailable())
    }

    async fn monthly_income(&self, _: Uuid, _: NaiveDate, _: NaiveDate) -> Result<Vec<MonthlyTotal>> {
        Err(unavailable())
    }

    async fn monthly_expenses(&self, _: Uuid, _: NaiveDate, _: NaiveDate) -> Result<Vec<MonthlyTotal>> {
        Err(unavailable())
    }

    async fn create_advice(&self, _: NewAdvice) -> Result<FinancialAdvice> {
        Err(unavailable())
    }

    async fn create_anomaly(&self, _: NewAnomaly) -> Result<ExpenseAnomaly> {
        Err(unavailable())
    }

    async fn create_forecast(&self, _: NewForecast) -> Result<FinancialForecast> {
        Err(unavailable())
    }

    async fn create_calculation(&self, _: NewCalculation) -> Result<FinancialCalculation> {
        Err(unavailable())
    }

    async fn list_advice(&self, _: Uuid, _: usize) -> Result<Vec<FinancialAdvice>> {
        Err(unavailable())
    }

    async fn list_anomalies(&self, _: Uuid, _: usize) -> Result<Vec<ExpenseAnomaly>> {
        Err(unavailable())
    }

    async fn list_forecasts(&self, _: Uuid, _: usize) -> Result<Vec<FinancialForecast>> {
        Err(unavailable())
    }

    async fn list_calculations(&self, _: Uuid, _: usize) -> Result<Vec<FinancialCalculation>> {
        Err(unavailable())
    }
}

#[cfg(test)]
fn unavailable() -> crate::error::InsightError {
    crate::error::InsightError::Store("store unavailable".to_string())
}
