//! Financial Insights Engine
//!
//! Generates financial advice, expense anomaly flags, forecasts and ad-hoc
//! calculations by prompting a text generation service and turning its
//! replies into typed, persisted records.
//!
//! PIPELINE:
//! INPUTS → PROMPT → GENERATE → EXTRACT (structured → scalar) → NORMALIZE → PERSIST
//!
//! Every caller-facing operation on `InsightEngine` is total: malformed
//! replies, remote failures and store errors all end in a placeholder record.

pub mod config;
pub mod error;
pub mod extraction;
pub mod generator;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod services;
pub mod store;

pub use error::{InsightError, Result};

// Re-export common types
pub use config::InsightConfig;
pub use extraction::{ExtractedPayload, ExtractionStage, ResponseParser};
pub use generator::{GeminiClient, ScriptedGenerator, TextGenerator};
pub use models::*;
pub use services::InsightEngine;
pub use store::{FinanceStore, InMemoryFinanceStore, PgFinanceStore};
