//! Caller-facing entry point
//!
//! The four insight operations are total: any error left over from a service
//! is logged and replaced by a placeholder record. Placeholders are persisted
//! when the store accepts them and materialized locally when it does not.

use crate::config::InsightConfig;
use crate::generator::TextGenerator;
use crate::models::{
    AdviceType, CalculationResult, Dashboard, ExpenseAnomaly, FinancialAdvice,
    FinancialCalculation, FinancialForecast, NewAdvice, NewAnomaly, NewCalculation, NewForecast,
};
use crate::services::advice::fallback_advice;
use crate::services::anomaly::{general_anomaly, DETECTION_FAILED};
use crate::services::calculator::failed_calculation;
use crate::services::forecast::{placeholder_forecasts, PlaceholderReason};
use crate::services::{
    AdviceService, AnomalyService, CalculatorService, ForecastService, InsightContext,
};
use crate::store::FinanceStore;
use crate::Result;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

pub struct InsightEngine {
    ctx: InsightContext,
    advice: AdviceService,
    anomalies: AnomalyService,
    forecasts: ForecastService,
    calculator: CalculatorService,
}

impl InsightEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn FinanceStore>,
        config: InsightConfig,
    ) -> Self {
        let ctx = InsightContext::new(generator, store, config);
        Self {
            advice: AdviceService::new(ctx.clone()),
            anomalies: AnomalyService::new(ctx.clone()),
            forecasts: ForecastService::new(ctx.clone()),
            calculator: CalculatorService::new(ctx.clone()),
            ctx,
        }
    }

    /// Saving advice
    pub async fn generate_advice(&self, user_id: Uuid) -> FinancialAdvice {
        self.generate_advice_of_type(user_id, AdviceType::Saving).await
    }

    pub async fn generate_advice_of_type(
        &self,
        user_id: Uuid,
        advice_type: AdviceType,
    ) -> FinancialAdvice {
        match self.advice.generate(user_id, advice_type).await {
            Ok(advice) => advice,
            Err(e) => {
                error!(user_id = %user_id, "Error generating financial advice: {}", e);
                self.persist_advice(fallback_advice(user_id, advice_type)).await
            }
        }
    }

    pub async fn detect_anomalies(&self, user_id: Uuid) -> Vec<ExpenseAnomaly> {
        match self.anomalies.detect(user_id).await {
            Ok(anomalies) => anomalies,
            Err(e) => {
                error!(user_id = %user_id, "Error detecting anomalies: {}", e);
                vec![self.persist_anomaly(general_anomaly(user_id, DETECTION_FAILED)).await]
            }
        }
    }

    pub async fn forecast_expenses(&self, user_id: Uuid) -> Vec<FinancialForecast> {
        match self.forecasts.forecast(user_id).await {
            Ok(forecasts) => forecasts,
            Err(e) => {
                error!(user_id = %user_id, "Error generating forecasts: {}", e);
                let drafts = placeholder_forecasts(
                    user_id,
                    self.ctx.today(),
                    &self.ctx.config.limits,
                    PlaceholderReason::Failure,
                );
                let mut forecasts = Vec::with_capacity(drafts.len());
                for draft in drafts {
                    forecasts.push(self.persist_forecast(draft).await);
                }
                forecasts
            }
        }
    }

    pub async fn calculate(&self, user_id: Uuid, query: &str) -> CalculationResult {
        match self.calculator.calculate(user_id, query).await {
            Ok(result) => result,
            Err(e) => {
                error!(user_id = %user_id, "Error processing calculation: {}", e);
                let draft = failed_calculation(user_id, query, self.ctx.parser.normalizer());
                self.persist_calculation(draft).await.into()
            }
        }
    }

    /// Latest advice, anomalies and forecasts
    pub async fn dashboard(&self, user_id: Uuid) -> Result<Dashboard> {
        let limits = &self.ctx.config.limits;
        let store = &self.ctx.store;

        Ok(Dashboard {
            advice: store.list_advice(user_id, limits.dashboard_advice_count).await?,
            anomalies: store
                .list_anomalies(user_id, limits.dashboard_anomaly_count)
                .await?,
            forecasts: store
                .list_forecasts(user_id, limits.dashboard_forecast_count)
                .await?,
        })
    }

    pub async fn recent_calculations(&self, user_id: Uuid) -> Result<Vec<FinancialCalculation>> {
        self.ctx
            .store
            .list_calculations(user_id, self.ctx.config.limits.recent_calculation_count)
            .await
    }

    async fn persist_advice(&self, draft: NewAdvice) -> FinancialAdvice {
        match self.ctx.store.create_advice(draft.clone()).await {
            Ok(advice) => advice,
            Err(e) => {
                warn!("Placeholder advice not persisted: {}", e);
                draft.into_record()
            }
        }
    }

    async fn persist_anomaly(&self, draft: NewAnomaly) -> ExpenseAnomaly {
        match self.ctx.store.create_anomaly(draft.clone()).await {
            Ok(anomaly) => anomaly,
            Err(e) => {
                warn!("Placeholder anomaly not persisted: {}", e);
                draft.into_record()
            }
        }
    }

    async fn persist_forecast(&self, draft: NewForecast) -> FinancialForecast {
        match self.ctx.store.create_forecast(draft.clone()).await {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!("Placeholder forecast not persisted: {}", e);
                draft.into_record()
            }
        }
    }

    async fn persist_calculation(&self, draft: NewCalculation) -> FinancialCalculation {
        match self.ctx.store.create_calculation(draft.clone()).await {
            Ok(calculation) => calculation,
            Err(e) => {
                warn!("Placeholder calculation not persisted: {}", e);
                draft.into_record()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ScriptedGenerator, ERROR_MARKER};
    use crate::models::{AnomalyType, ForecastType, Transaction};
    use crate::services::advice::{ADVICE_UNAVAILABLE, INSUFFICIENT_DATA_ADVICE};
    use crate::services::calculator::CALCULATION_FAILED;
    use crate::store::{FailingStore, InMemoryFinanceStore};
    use bigdecimal::BigDecimal;
    use chrono::{Duration, Utc};

    fn engine_with(generator: ScriptedGenerator, store: Arc<dyn FinanceStore>) -> InsightEngine {
        InsightEngine::new(Arc::new(generator), store, InsightConfig::default())
    }

    #[tokio::test]
    async fn test_failing_store_still_yields_placeholders() {
        let engine = engine_with(ScriptedGenerator::repeating("{\"tips\": [\"x\"]}"), Arc::new(FailingStore));
        let user = Uuid::new_v4();

        let advice = engine.generate_advice(user).await;
        assert_eq!(advice.advice_text, INSUFFICIENT_DATA_ADVICE);
        assert_eq!(advice.advice_type, AdviceType::Saving);

        let anomalies = engine.detect_anomalies(user).await;
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].description, DETECTION_FAILED);
        assert_eq!(anomalies[0].category, "General");

        let forecasts = engine.forecast_expenses(user).await;
        assert_eq!(forecasts.len(), 3);
        assert!(forecasts.iter().all(|f| f.confidence_score == 0.5));
        assert_eq!(forecasts[1].forecast_type, ForecastType::Income);

        let calculation = engine.calculate(user, "What is 10% of $200?").await;
        assert_eq!(calculation.explanation, CALCULATION_FAILED);

        assert!(engine.dashboard(user).await.is_err());
    }

    #[tokio::test]
    async fn test_sentinel_replies_become_placeholders() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let sentinel = format!("{} 503 Service Unavailable", ERROR_MARKER);
        let engine = engine_with(ScriptedGenerator::repeating(sentinel), store.clone());
        let user = Uuid::new_v4();

        store
            .add_transaction(
                user,
                Transaction {
                    date: Utc::now().date_naive() - Duration::days(3),
                    category: None,
                    amount: BigDecimal::from(-80),
                },
            )
            .await;

        let advice = engine.generate_advice(user).await;
        assert_eq!(advice.advice_text, ADVICE_UNAVAILABLE);

        let anomalies = engine.detect_anomalies(user).await;
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::UnusualAmount);
        assert!(anomalies[0].description.contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_dashboard_limits_and_order() {
        let store = Arc::new(InMemoryFinanceStore::new());
        let engine = engine_with(
            ScriptedGenerator::repeating("{\"tips\": [\"Keep going\"]}"),
            store.clone(),
        );
        let user = Uuid::new_v4();

        for _ in 0..7 {
            engine.generate_advice(user).await;
        }
        engine.forecast_expenses(user).await;
        engine.forecast_expenses(user).await;
        for i in 0..12 {
            engine.calculate(user, &format!("What is {} plus 1?", i)).await;
        }

        let dashboard = engine.dashboard(user).await.unwrap();
        assert_eq!(dashboard.advice.len(), 5);
        assert_eq!(dashboard.anomalies.len(), 0);
        assert_eq!(dashboard.forecasts.len(), 3);

        let recent = engine.recent_calculations(user).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].query, "What is 11 plus 1?");
    }
}
