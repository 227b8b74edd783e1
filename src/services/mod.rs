//! Domain aggregation services
//!
//! Each service gathers inputs from the store, renders a prompt, calls the
//! generator, runs the reply through the extraction chain and persists the
//! resulting records. `InsightEngine` fronts them and makes every
//! operation total.

use crate::config::InsightConfig;
use crate::extraction::{CurrencyNormalizer, ResponseParser};
use crate::generator::TextGenerator;
use crate::store::FinanceStore;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub mod advice;
pub mod anomaly;
pub mod calculator;
pub mod engine;
pub mod forecast;

pub use advice::AdviceService;
pub use anomaly::AnomalyService;
pub use calculator::CalculatorService;
pub use engine::InsightEngine;
pub use forecast::ForecastService;

/// Shared handles every service works with
#[derive(Clone)]
pub struct InsightContext {
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn FinanceStore>,
    pub parser: ResponseParser,
    pub config: Arc<InsightConfig>,
}

impl InsightContext {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn FinanceStore>,
        config: InsightConfig,
    ) -> Self {
        let parser = ResponseParser::new(CurrencyNormalizer::from_config(&config.currency));
        Self {
            generator,
            store,
            parser,
            config: Arc::new(config),
        }
    }

    /// Marker every amount is written with
    pub fn marker(&self) -> &str {
        &self.config.currency.target_marker
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Replace a failed input read with a default value, logging the failure
pub(crate) fn input_or_default<T: Default>(
    result: crate::Result<T>,
    input: &str,
    user_id: Uuid,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(user_id = %user_id, input = input, "Error reading input: {}", e);
            T::default()
        }
    }
}
