//! Engine configuration
//!
//! All process-wide settings live in one immutable value that is handed to
//! the engine at construction. Nothing below reads the environment after
//! startup.

use crate::error::InsightError;
use crate::Result;
use std::env;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Fixed sampling parameters sent with every generation request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

/// Remote text generation settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub sampling: SamplingParams,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Full `generateContent` endpoint without the key parameter
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
        }
    }
}

/// Currency markers used by normalization and prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyConfig {
    /// Marker rewritten wherever it appears in model output
    pub source_marker: String,
    /// Marker every persisted amount is expressed in
    pub target_marker: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            source_marker: "$".to_string(),
            target_marker: "₹".to_string(),
        }
    }
}

impl CurrencyConfig {
    /// A target marker that contains the source marker would be rewritten
    /// again on every pass, so normalization would not be idempotent.
    pub fn validate(&self) -> Result<()> {
        let source = self.source_marker.as_str();
        if !source.is_empty() && source != self.target_marker && self.target_marker.contains(source) {
            return Err(InsightError::Config(format!(
                "target currency marker {:?} contains source marker {:?}",
                self.target_marker, source
            )));
        }
        Ok(())
    }

    /// This config if valid, otherwise the defaults
    pub fn validated(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                warn!("{}; using default currency markers", e);
                Self::default()
            }
        }
    }
}

/// Thresholds and budgets for the aggregation services
#[derive(Debug, Clone)]
pub struct ServiceLimits {
    pub default_max_tokens: u32,
    pub calculator_max_tokens: u32,
    /// Trailing window scanned for anomalies
    pub anomaly_window_days: i64,
    pub anomaly_max_transactions: usize,
    /// Trailing window aggregated for forecasts
    pub forecast_window_days: i64,
    /// Minimum monthly points before a series is sent for forecasting
    pub forecast_min_points: usize,
    pub forecast_max_predictions: usize,
    pub forecast_step_days: i64,
    pub dashboard_advice_count: usize,
    pub dashboard_anomaly_count: usize,
    pub dashboard_forecast_count: usize,
    pub recent_calculation_count: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            default_max_tokens: 1024,
            calculator_max_tokens: 2048,
            anomaly_window_days: 90,
            anomaly_max_transactions: 50,
            forecast_window_days: 365,
            forecast_min_points: 3,
            forecast_max_predictions: 3,
            forecast_step_days: 30,
            dashboard_advice_count: 5,
            dashboard_anomaly_count: 5,
            dashboard_forecast_count: 3,
            recent_calculation_count: 10,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default)]
pub struct InsightConfig {
    pub client: ClientConfig,
    pub currency: CurrencyConfig,
    pub limits: ServiceLimits,
}

impl InsightConfig {
    /// Build configuration from environment variables (after `.env` is loaded)
    pub fn from_env() -> Self {
        let defaults = ClientConfig::default();
        let currency_defaults = CurrencyConfig::default();

        let client = ClientConfig {
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            model: env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            sampling: SamplingParams::default(),
        };

        let currency = CurrencyConfig {
            source_marker: env::var("INSIGHTS_SOURCE_CURRENCY")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(currency_defaults.source_marker),
            target_marker: env::var("INSIGHTS_TARGET_CURRENCY")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(currency_defaults.target_marker),
        }
        .validated();

        Self {
            client,
            currency,
            limits: ServiceLimits::default(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        let key = self.client.api_key.trim();
        !key.is_empty() && key != "your_gemini_api_key_here"
    }
}
