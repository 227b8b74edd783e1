//! Monetary amount recovery from model output

use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::str::FromStr;

lazy_static! {
    static ref MARKED_AMOUNT: Regex =
        Regex::new(r"(?:₹|Rs\.?|INR|\$)\s*(-?[\d,]*\d(?:\.\d+)?)").unwrap();
    static ref LEADING_NUMBER: Regex = Regex::new(r"^-?[\d,]*\d(?:\.\d+)?").unwrap();
}

/// Round half away from zero to two decimal places for storage
pub fn to_money(amount: BigDecimal) -> BigDecimal {
    amount.round(2).with_scale(2)
}

pub fn zero_money() -> BigDecimal {
    to_money(BigDecimal::from(0))
}

/// Parse text such as "₹1,234.56", "Rs. 500" or "1200" into an amount
pub fn parse_amount_text(text: &str) -> Option<BigDecimal> {
    let mut cleaned = text.trim();
    for marker in ["₹", "Rs.", "Rs", "INR", "$"] {
        if let Some(rest) = cleaned.strip_prefix(marker) {
            cleaned = rest.trim_start();
            break;
        }
    }

    let number = LEADING_NUMBER.find(cleaned)?;
    if number.end() != cleaned.trim_end().len() {
        return None;
    }
    BigDecimal::from_str(&number.as_str().replace(',', "")).ok()
}

/// Amount from a JSON field holding either a number or amount text
pub fn amount_from_value(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => parse_amount_text(s),
        _ => None,
    }
}

/// Number written right after the first currency marker in free text
pub fn amount_after_marker(text: &str) -> Option<BigDecimal> {
    let captures = MARKED_AMOUNT.captures(text)?;
    let digits = captures.get(1)?.as_str().replace(',', "");
    BigDecimal::from_str(&digits).ok()
}
