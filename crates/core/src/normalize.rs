//! Field normalizers shared by the schema validator and the OCR heuristics.

use chrono::{Datelike, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::SchemaError;

/// Accepted date layouts, tried in order. Month-first before day-first, so
/// an ambiguous `03/04/2024` reads as March 4th.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%d/%m/%y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
    "%I:%M:%S%p",
    "%I:%M%p",
    // Receipts sometimes print a 24h clock with a meridiem anyway.
    "%H:%M:%S %p",
    "%H:%M %p",
];

pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let v = input.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(v, fmt) {
            // chrono takes "23" for %Y; a four-digit year is required there.
            if fmt.contains("%Y") && d.year() < 1000 {
                continue;
            }
            return Some(d);
        }
    }
    // ISO timestamps: "2024-01-15T10:30:00Z", "2024-01-15 10:30".
    if v.len() > 10 && v.is_char_boundary(10) && matches!(v.as_bytes()[10], b'T' | b' ') {
        return NaiveDate::parse_from_str(&v[..10], "%Y-%m-%d").ok();
    }
    None
}

/// Normalize a date string to `YYYY-MM-DD`.
pub fn normalize_date(input: &str) -> Result<NaiveDate, SchemaError> {
    parse_date(input).ok_or_else(|| SchemaError::InvalidDate(input.to_string()))
}

pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let v = input.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(v, fmt).ok())
}

/// Normalize a time string; callers render it as `HH:MM`.
pub fn normalize_time(input: &str) -> Result<NaiveTime, SchemaError> {
    parse_time(input).ok_or_else(|| SchemaError::InvalidTime(input.to_string()))
}

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("$", "USD"),
    ("US$", "USD"),
    ("C$", "CAD"),
    ("CA$", "CAD"),
    ("CAD$", "CAD"),
    ("A$", "AUD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
];

/// Normalize a currency to an upper-case ISO-4217 style code.
pub fn normalize_currency(input: &str) -> Result<String, SchemaError> {
    let v = input.trim().to_uppercase();
    if let Some((_, code)) = CURRENCY_SYMBOLS.iter().find(|(sym, _)| *sym == v) {
        return Ok((*code).to_string());
    }
    if v.len() == 3 && v.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(v);
    }
    Err(SchemaError::InvalidCurrency(input.to_string()))
}

/// Parse a printed amount: `"$1,234.56"`, `".074"`, `"12.50 USD"`.
///
/// Commas are thousands separators. Returns `None` for anything that is not
/// a plain decimal once symbols are stripped.
/// Accounting-style `(5.00)` parses as negative.
pub fn parse_amount_str(input: &str) -> Option<Decimal> {
    let outer = input
        .trim()
        .trim_matches(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | '(' | ')')));
    let parenthesized = outer.len() > 2 && outer.starts_with('(') && outer.ends_with(')');
    let trimmed = outer.trim_matches(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'));
    let clean: String = trimmed
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if clean.is_empty() {
        return None;
    }
    let value = Decimal::from_str(&clean)
        .or_else(|_| Decimal::from_scientific(&clean))
        .ok()?
        .normalize();
    Some(if parenthesized { -value.abs() } else { value })
}

/// Reject negative amounts; every money field in the schema is `>= 0`.
pub fn non_negative(field: &'static str, value: Decimal) -> Result<Decimal, SchemaError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(SchemaError::Negative {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Serde adapter for `Option<NaiveTime>` rendered as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(v) => super::parse_time(&v)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid time '{v}'"))),
            None => Ok(None),
        }
    }
}
