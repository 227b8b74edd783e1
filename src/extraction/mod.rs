//! Response extraction pipeline
//!
//! Turns raw model text into either a structured JSON payload or, when no
//! payload can be recovered, a best-effort scalar. The structured stages are
//! an ordered list of candidate finders; the first candidate that parses as a
//! JSON object or array wins. Every recovered payload is currency-normalized
//! before it leaves this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub mod amount;
pub mod currency;
pub mod scalar;

pub use amount::{amount_after_marker, amount_from_value, parse_amount_text, to_money, zero_money};
pub use currency::CurrencyNormalizer;
pub use scalar::{extract_scalar, ScalarExtractor, ScalarMatch, NO_RESULT};

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Which stage produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    /// Whole reply was JSON
    DirectJson,
    /// Inside a ```json fence
    TaggedFence,
    /// Inside the first plain ``` fence
    Fence,
    /// First `{` through last `}`
    BraceScan,
    /// First `[` through last `]`
    BracketScan,
    /// Money, percentage or duration token
    Pattern,
    /// Sentence stating a number
    SentenceHeuristic,
    /// First non-empty line
    FirstLine,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionStage::DirectJson => "direct-json",
            ExtractionStage::TaggedFence => "tagged-fence",
            ExtractionStage::Fence => "fenced-code-block",
            ExtractionStage::BraceScan => "brace-scan",
            ExtractionStage::BracketScan => "bracket-scan",
            ExtractionStage::Pattern => "pattern",
            ExtractionStage::SentenceHeuristic => "sentence-heuristic",
            ExtractionStage::FirstLine => "first-line-fallback",
        };
        write!(f, "{}", s)
    }
}

/// JSON object or array recovered from a reply
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredPayload {
    pub value: Value,
    pub stage: ExtractionStage,
}

/// Result of running the full chain over one reply
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedPayload {
    Structured {
        value: Value,
        stage: ExtractionStage,
    },
    /// No structured payload. `scalar` is the best guess, `note` the whole
    /// normalized reply for context.
    Degraded {
        scalar: String,
        note: String,
        stage: ExtractionStage,
    },
}

type CandidateFinder = fn(&str) -> Option<&str>;

/// Structured stages in the order they are tried
const STRUCTURED_STAGES: &[(ExtractionStage, CandidateFinder)] = &[
    (ExtractionStage::DirectJson, whole_text),
    (ExtractionStage::TaggedFence, tagged_fence),
    (ExtractionStage::Fence, untagged_fence),
    (ExtractionStage::BraceScan, brace_span),
    (ExtractionStage::BracketScan, bracket_span),
];

fn whole_text(text: &str) -> Option<&str> {
    Some(text)
}

fn tagged_fence(text: &str) -> Option<&str> {
    let start = text.find(JSON_FENCE)? + JSON_FENCE.len();
    let rest = &text[start..];
    let end = rest.find(FENCE)?;
    Some(&rest[..end])
}

fn untagged_fence(text: &str) -> Option<&str> {
    let start = text.find(FENCE)? + FENCE.len();
    let rest = &text[start..];
    let end = rest.find(FENCE)?;
    Some(strip_language_tag(&rest[..end]))
}

/// Drop a leading `javascript` / `JSON` style tag line inside a fence
fn strip_language_tag(block: &str) -> &str {
    if let Some((first, remainder)) = block.split_once('\n') {
        let tag = first.trim();
        if !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return remainder;
        }
    }
    block
}

fn brace_span(text: &str) -> Option<&str> {
    span_between(text, '{', '}')
}

fn bracket_span(text: &str) -> Option<&str> {
    span_between(text, '[', ']')
}

fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn parse_container(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Run the structured stages in order and return the first payload found
pub fn extract_structured(
    text: &str,
    normalizer: &CurrencyNormalizer,
) -> Option<StructuredPayload> {
    STRUCTURED_STAGES.iter().find_map(|(stage, find_candidate)| {
        let candidate = find_candidate(text)?;
        let value = parse_container(candidate)?;
        Some(StructuredPayload {
            value: normalizer.normalize_value(value),
            stage: *stage,
        })
    })
}

/// `(payload, matched)`; the payload is `Null` when nothing matched
pub fn extract(text: &str, normalizer: &CurrencyNormalizer) -> (Value, bool) {
    match extract_structured(text, normalizer) {
        Some(payload) => (payload.value, true),
        None => (Value::Null, false),
    }
}

/// True when some stage located a candidate, even if it failed to parse
fn has_json_candidate(text: &str) -> bool {
    STRUCTURED_STAGES
        .iter()
        .skip(1)
        .any(|(_, find_candidate)| find_candidate(text).is_some())
}

/// Structured extraction with the scalar fallback chained behind it
#[derive(Debug, Clone)]
pub struct ResponseParser {
    normalizer: CurrencyNormalizer,
    scalar: ScalarExtractor,
}

impl ResponseParser {
    pub fn new(normalizer: CurrencyNormalizer) -> Self {
        Self {
            scalar: ScalarExtractor::new(normalizer.clone()),
            normalizer,
        }
    }

    pub fn normalizer(&self) -> &CurrencyNormalizer {
        &self.normalizer
    }

    pub fn parse(&self, text: &str) -> ExtractedPayload {
        if let Some(payload) = extract_structured(text, &self.normalizer) {
            debug!(stage = %payload.stage, "Structured payload recovered");
            return ExtractedPayload::Structured {
                value: payload.value,
                stage: payload.stage,
            };
        }

        if has_json_candidate(text) {
            debug!("Reply contained malformed JSON; using scalar fallback");
        } else {
            debug!("Reply contained no JSON; using scalar fallback");
        }

        let found = self.scalar.extract(text);
        ExtractedPayload::Degraded {
            scalar: found.value,
            note: self.normalizer.normalize_str(text.trim()),
            stage: found.stage,
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(CurrencyNormalizer::default())
    }
}
