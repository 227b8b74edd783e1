//! Scalar fallback
//!
//! Used when no structured payload can be recovered. Always yields some text:
//! a money/percentage/duration token, a stated sentence, or the first line.

use crate::extraction::currency::CurrencyNormalizer;
use crate::extraction::ExtractionStage;
use lazy_static::lazy_static;
use regex::Regex;

/// Returned when the input has no usable content at all
pub const NO_RESULT: &str = "Unable to extract result";

lazy_static! {
    /// Ordered result patterns, first match wins
    static ref RESULT_PATTERNS: Vec<Regex> = [
        r"₹[\d,]+\.\d{2}",
        r"₹[\d,]+",
        r"INR[\d,]+\.\d{2}",
        r"INR[\d,]+",
        r"Rs\.[\d,]+\.\d{2}",
        r"Rs\.[\d,]+",
        r"[\d,]+\.\d{2}%",
        r"[\d,]+%",
        r"[\d,]+\.\d{2}",
        r"[\d,]+ years",
        r"[\d,]+ months",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect();

    static ref IS_WORD: Regex = Regex::new(r"(?i)\bis\b").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarMatch {
    pub value: String,
    pub stage: ExtractionStage,
}

#[derive(Debug, Clone)]
pub struct ScalarExtractor {
    normalizer: CurrencyNormalizer,
    /// Amounts written with the foreign marker, tried after the result patterns
    source_patterns: Vec<Regex>,
}

impl ScalarExtractor {
    pub fn new(normalizer: CurrencyNormalizer) -> Self {
        let marker = regex::escape(normalizer.source_marker());
        let source_patterns = if marker.is_empty() {
            Vec::new()
        } else {
            [
                format!(r"{}[\d,]+\.\d{{2}}", marker),
                format!(r"{}[\d,]+", marker),
            ]
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
        };

        Self {
            normalizer,
            source_patterns,
        }
    }

    pub fn extract(&self, text: &str) -> ScalarMatch {
        let found = RESULT_PATTERNS
            .iter()
            .chain(self.source_patterns.iter())
            .find_map(|re| re.find(text));

        if let Some(m) = found {
            return ScalarMatch {
                value: self.normalizer.normalize_str(m.as_str()),
                stage: ExtractionStage::Pattern,
            };
        }

        if let Some(sentence) = first_stated_sentence(text) {
            return ScalarMatch {
                value: self.normalizer.normalize_str(sentence),
                stage: ExtractionStage::SentenceHeuristic,
            };
        }

        let value = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| self.normalizer.normalize_str(line))
            .unwrap_or_else(|| NO_RESULT.to_string());

        ScalarMatch {
            value,
            stage: ExtractionStage::FirstLine,
        }
    }
}

/// Convenience wrapper for one-off extraction
pub fn extract_scalar(text: &str, normalizer: &CurrencyNormalizer) -> ScalarMatch {
    ScalarExtractor::new(normalizer.clone()).extract(text)
}

/// First period-delimited sentence that states something ("is") about a number
fn first_stated_sentence(text: &str) -> Option<&str> {
    text.split('.')
        .map(str::trim)
        .find(|sentence| {
            IS_WORD.is_match(sentence) && sentence.chars().any(|c| c.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(text: &str) -> ScalarMatch {
        extract_scalar(text, &CurrencyNormalizer::default())
    }

    #[test]
    fn test_rupee_decimal_amount() {
        let found = scalar("The total is ₹1,234.56 after fees.");
        assert_eq!(found.value, "₹1,234.56");
        assert_eq!(found.stage, ExtractionStage::Pattern);
    }

    #[test]
    fn test_pattern_priority() {
        assert_eq!(scalar("Rate of 7.25% gives ₹900").value, "₹900");
        assert_eq!(scalar("Pay INR12,000 monthly").value, "INR12,000");
        assert_eq!(scalar("About Rs.450.50 per day").value, "Rs.450.50");
        assert_eq!(scalar("Growth of 12% expected").value, "12%");
        assert_eq!(scalar("Ratio comes to 1.25 overall").value, "1.25");
        assert_eq!(scalar("It takes 15 years to double").value, "15 years");
        assert_eq!(scalar("Payback in 18 months").value, "18 months");
    }

    #[test]
    fn test_dollar_amount_is_rewritten() {
        let found = scalar("You would end up with $525 in total");
        assert_eq!(found.value, "₹525");
        assert_eq!(found.stage, ExtractionStage::Pattern);

        let found = scalar("Final value: $1,050.75");
        // the bare decimal pattern wins over the foreign marker
        assert_eq!(found.value, "1,050.75");
    }

    #[test]
    fn test_sentence_heuristic() {
        let found = scalar("Let me think. The answer is 42 units. Done");
        assert_eq!(found.value, "The answer is 42 units");
        assert_eq!(found.stage, ExtractionStage::SentenceHeuristic);
    }

    #[test]
    fn test_first_line_fallback() {
        let found = scalar("\n\n  Budget looks healthy for $ spending  \nSecond line");
        assert_eq!(found.value, "Budget looks healthy for ₹ spending");
        assert_eq!(found.stage, ExtractionStage::FirstLine);
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(scalar("").value, NO_RESULT);
        assert_eq!(scalar("   \n  ").value, NO_RESULT);
    }

    #[test]
    fn test_never_empty_and_never_dollar() {
        let inputs = [
            "$",
            "x",
            "The cost is $5",
            "is 1",
            "$$ and $",
            "Nothing numeric here at all",
            "{\"broken\": ",
        ];
        for input in inputs {
            let found = scalar(input);
            assert!(!found.value.is_empty(), "empty result for {:?}", input);
            assert!(!found.value.contains('$'), "dollar kept for {:?}", input);
        }
    }
}
