//! Turns free-form service output into a [`Decision`].
//!
//! Recovery order: strict JSON, JSON inside a code fence, then the first
//! balanced `{...}` object in the text. Anything that still fails, lacks a
//! valid `decision` literal or omits a contract key becomes FLAT with the raw
//! text kept.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use trade_core::numeric::{decimal_from_value, integer_from_value};
use trade_core::{Decision, DecisionKind};

/// Keys every reply must carry. Present-but-null values are accepted; extra
/// keys such as `lot_size` are tolerated.
pub const CONTRACT_KEYS: [&str; 7] = [
    "decision",
    "instrument",
    "qty",
    "entry_price",
    "stoploss",
    "rationale",
    "confidence_percent",
];

pub fn parse_decision(symbol: &str, raw: &str) -> Decision {
    let text = raw.trim();
    if text.is_empty() {
        return Decision::flat_unparsed(symbol, "empty response from reasoning service", raw);
    }

    match extract_json_object(text) {
        Some(obj) => normalize(symbol, raw, &obj),
        None => Decision::flat_unparsed(symbol, "no JSON object in reasoning response", raw),
    }
}

pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Some(obj) = parse_object(text) {
        return Some(obj);
    }

    if let Some(obj) = strip_code_fence(text).and_then(parse_object) {
        return Some(obj);
    }

    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            if let Some(obj) = parse_object(&text[start..start + end]) {
                return Some(obj);
            }
        }
        from = start + 1;
    }
    None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Body of the first ```` ``` ```` fence, without the language tag.
fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
/// Braces inside string literals are ignored.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn normalize(symbol: &str, raw: &str, obj: &Map<String, Value>) -> Decision {
    let kind = obj
        .get("decision")
        .and_then(Value::as_str)
        .and_then(DecisionKind::parse);
    let Some(kind) = kind else {
        let problem = match obj.get("decision") {
            None | Some(Value::Null) => "reasoning response has no decision".to_string(),
            Some(v) => format!("unrecognized decision {}", v),
        };
        return Decision::flat_unparsed(symbol, &problem, raw);
    };

    if let Some(missing) = CONTRACT_KEYS.iter().find(|k| !obj.contains_key(**k)) {
        return Decision::flat_unparsed(symbol, &format!("missing key {}", missing), raw);
    }

    let instrument = obj
        .get("instrument")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(symbol)
        .to_string();

    let qty = obj
        .get("qty")
        .and_then(integer_from_value)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);

    let lot_size = obj
        .get("lot_size")
        .and_then(integer_from_value)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= 1)
        .unwrap_or(1);

    let rationale = match obj.get("rationale") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };

    Decision {
        decision: kind,
        instrument,
        qty,
        entry_price: obj.get("entry_price").and_then(decimal_from_value),
        stoploss: obj.get("stoploss").and_then(decimal_from_value),
        lot_size,
        rationale,
        confidence_percent: obj
            .get("confidence_percent")
            .map(confidence_from_value)
            .unwrap_or(0),
        raw: None,
    }
}

/// 0..=100, rounded. Accepts `72`, `"72"`, `"72%"`, `71.6`.
fn confidence_from_value(value: &Value) -> u8 {
    let parsed = match value {
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%');
            decimal_from_value(&Value::String(s.to_string()))
        }
        other => decimal_from_value(other),
    };
    parsed
        .map(|d| d.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED).round())
        .and_then(|d| d.to_u8())
        .unwrap_or(0)
}
