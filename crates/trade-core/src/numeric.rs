//! Lenient numeric coercion for JSON coming from callers and the reasoning
//! service. Numbers and numeric strings are accepted; everything else is `None`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Parse a JSON number or numeric string into an exact decimal.
///
/// Numbers go through their textual form so `19450.25` stays `19450.25`
/// instead of picking up binary float noise.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim().trim_start_matches('₹').trim()),
        _ => None,
    }
}

/// Parse a JSON number or numeric string into an integer. Fractional values
/// are rejected rather than truncated.
pub fn integer_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                parse_decimal(s)
                    .filter(|d| d.fract().is_zero())
                    .and_then(|d| d.to_i64())
            })
        }
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    let cleaned = s.replace(',', "");
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decimals_from_numbers_and_strings() {
        assert_eq!(decimal_from_value(&json!(19500)), Some(Decimal::from(19500)));
        assert_eq!(
            decimal_from_value(&json!(19450.25)),
            Some(Decimal::from_str("19450.25").unwrap())
        );
        assert_eq!(
            decimal_from_value(&json!(" 1,234.5 ")),
            Some(Decimal::from_str("1234.5").unwrap())
        );
        assert_eq!(decimal_from_value(&json!("abc")), None);
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!([1])), None);
    }

    #[test]
    fn integers_reject_fractions() {
        assert_eq!(integer_from_value(&json!(50)), Some(50));
        assert_eq!(integer_from_value(&json!(50.0)), Some(50));
        assert_eq!(integer_from_value(&json!("75")), Some(75));
        assert_eq!(integer_from_value(&json!(2.5)), None);
        assert_eq!(integer_from_value(&json!("2.5")), None);
        assert_eq!(integer_from_value(&json!(true)), None);
    }
}
