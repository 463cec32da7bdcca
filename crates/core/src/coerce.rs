//! Conversion of operator-typed values into the wire representation a
//! field's declared kind requires.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::CoreError;
use crate::field_spec::{BooleanLabels, FieldKind, FieldSpec};
use crate::field_value::FieldValue;

const TRUE_WORDS: &[&str] = &["true", "1", "yes", "on", "oui"];
const FALSE_WORDS: &[&str] = &["false", "0", "no", "off", "non"];

/// Coerce `raw` according to `spec.kind`. Coercing an already-coerced value
/// returns it unchanged.
pub fn coerce_field(spec: &FieldSpec, raw: &FieldValue) -> Result<FieldValue, CoreError> {
    coerce(&spec.kind, raw).map_err(|reason| CoreError::InvalidFieldValue {
        field: spec.name.clone(),
        reason,
    })
}

pub fn coerce(kind: &FieldKind, raw: &FieldValue) -> Result<FieldValue, String> {
    match kind {
        FieldKind::Boolean { labels } => coerce_boolean(labels.as_ref(), raw),
        FieldKind::Integer => coerce_integer(raw),
        FieldKind::Decimal => coerce_decimal(raw),
        FieldKind::Date => coerce_date(raw),
        FieldKind::Text | FieldKind::Enum(_) => Ok(raw.clone()),
    }
}

fn coerce_boolean(labels: Option<&BooleanLabels>, raw: &FieldValue) -> Result<FieldValue, String> {
    if raw.is_blank() {
        return Ok(FieldValue::Null);
    }
    match raw {
        FieldValue::Boolean(b) => Ok(FieldValue::Boolean(*b)),
        FieldValue::Integer(0) => Ok(FieldValue::Boolean(false)),
        FieldValue::Integer(1) => Ok(FieldValue::Boolean(true)),
        FieldValue::Text(s) => {
            let s = s.trim();
            if let Some(labels) = labels {
                if s.eq_ignore_ascii_case(labels.truthy.trim()) {
                    return Ok(FieldValue::Boolean(true));
                }
                if s.eq_ignore_ascii_case(labels.falsy.trim()) {
                    return Ok(FieldValue::Boolean(false));
                }
            }
            if TRUE_WORDS.iter().any(|w| s.eq_ignore_ascii_case(w)) {
                Ok(FieldValue::Boolean(true))
            } else if FALSE_WORDS.iter().any(|w| s.eq_ignore_ascii_case(w)) {
                Ok(FieldValue::Boolean(false))
            } else {
                Err(format!("{raw} is not a boolean"))
            }
        }
        other => Err(format!("{other} is not a boolean")),
    }
}

fn coerce_integer(raw: &FieldValue) -> Result<FieldValue, String> {
    if raw.is_blank() {
        return Ok(FieldValue::Null);
    }
    match raw {
        FieldValue::Integer(n) => Ok(FieldValue::Integer(*n)),
        FieldValue::Float(x) => integral(*x).ok_or_else(|| format!("{x} is not an integer")),
        FieldValue::Text(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Ok(FieldValue::Integer(n));
            }
            parse_decimal(s)
                .and_then(integral)
                .ok_or_else(|| format!("{raw} is not an integer"))
        }
        other => Err(format!("{other} is not an integer")),
    }
}

fn integral(x: f64) -> Option<FieldValue> {
    // 2^63 bounds the exactly-representable integral range of i64.
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.223_372_036_854_776e18 {
        Some(FieldValue::Integer(x as i64))
    } else {
        None
    }
}

fn coerce_decimal(raw: &FieldValue) -> Result<FieldValue, String> {
    if raw.is_blank() {
        return Ok(FieldValue::Null);
    }
    match raw {
        FieldValue::Float(x) if x.is_finite() => Ok(FieldValue::Float(*x)),
        FieldValue::Integer(n) => Ok(FieldValue::Float(*n as f64)),
        FieldValue::Text(s) => parse_decimal(s.trim())
            .map(FieldValue::Float)
            .ok_or_else(|| format!("{raw} is not a number")),
        other => Err(format!("{other} is not a number")),
    }
}

/// Accepts `,` as the decimal separator when the text has no `.`.
fn parse_decimal(s: &str) -> Option<f64> {
    let normalized;
    let s = if !s.contains('.') && s.matches(',').count() == 1 {
        normalized = s.replace(',', ".");
        normalized.as_str()
    } else {
        s
    };
    s.parse::<f64>().ok().filter(|x| x.is_finite())
}

fn coerce_date(raw: &FieldValue) -> Result<FieldValue, String> {
    if raw.is_blank() {
        return Ok(FieldValue::Null);
    }
    match raw {
        FieldValue::Timestamp(ms) => Ok(FieldValue::Timestamp(*ms)),
        FieldValue::Integer(ms) => Ok(FieldValue::Timestamp(*ms)),
        FieldValue::Text(s) => parse_timestamp(s.trim())
            .map(FieldValue::Timestamp)
            .ok_or_else(|| format!("{raw} is not a date")),
        other => Err(format!("{other} is not a date")),
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().timestamp_millis());
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}
