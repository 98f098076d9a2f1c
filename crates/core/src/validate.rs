//! Raw model output (`serde_json::Value`) into a typed [`InvoiceData`].
//!
//! Coercion is lenient where the model is usually "almost right" (string
//! amounts, enum synonyms, mixed date layouts) and strict where a wrong value
//! would silently corrupt the record (negative money, impossible dates,
//! confidence outside 0..=1).

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::warn;

use crate::category::ExpenseCategory;
use crate::error::SchemaError;
use crate::invoice::{
    ExpenseItem, FuelInfo, FuelType, InvoiceData, DEFAULT_CONFIDENCE, DEFAULT_CURRENCY,
    MAX_INVOICE_NUMBER, MAX_ITEM_NAME, MAX_MERCHANT_NAME,
};
use crate::normalize::{
    non_negative, normalize_currency, normalize_date, normalize_time, parse_amount_str,
};
use crate::payment::PaymentMethod;

pub const RECOGNIZED_FIELDS: &[&str] = &[
    "merchant_name",
    "transaction_date",
    "transaction_time",
    "total_amount",
    "tax_amount",
    "subtotal",
    "items",
    "fuel_info",
    "invoice_number",
    "payment_method",
    "currency",
    "confidence_score",
];

pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(value: Value) -> Result<InvoiceData, SchemaError> {
        let obj = match value {
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Object(inner)) => inner,
                Some(other) => {
                    obj.insert("data".to_string(), other);
                    obj
                }
                None => obj,
            },
            other => return Err(SchemaError::NotAnObject(type_name(&other))),
        };

        if !RECOGNIZED_FIELDS.iter().any(|f| obj.contains_key(*f)) {
            return Err(SchemaError::NoRecognizedFields);
        }

        let confidence_score = match obj.get("confidence_score") {
            None | Some(Value::Null) => DEFAULT_CONFIDENCE,
            Some(v) => {
                let c = as_f64(v).ok_or(SchemaError::WrongType {
                    field: "confidence_score",
                    expected: "number",
                })?;
                if !(0.0..=1.0).contains(&c) {
                    return Err(SchemaError::ConfidenceOutOfRange(c));
                }
                c
            }
        };

        let transaction_date = match text(&obj, "transaction_date")? {
            Some(s) => Some(normalize_date(&s)?),
            None => None,
        };
        let transaction_time = match text(&obj, "transaction_time")? {
            Some(s) => Some(normalize_time(&s)?),
            None => None,
        };
        let currency = match text(&obj, "currency")? {
            Some(s) => normalize_currency(&s)?,
            None => DEFAULT_CURRENCY.to_string(),
        };

        let items = match obj.get("items") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(raw)) => raw
                .iter()
                .enumerate()
                .filter_map(|(idx, item)| match validate_item(item) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!(index = idx, error = %e, "Dropping invalid line item");
                        None
                    }
                })
                .collect(),
            Some(_) => {
                return Err(SchemaError::WrongType {
                    field: "items",
                    expected: "array",
                })
            }
        };

        let fuel_info = match obj.get("fuel_info") {
            None | Some(Value::Null) => None,
            Some(Value::Object(f)) => Some(validate_fuel(f)?).filter(|f| !f.is_empty()),
            Some(_) => {
                return Err(SchemaError::WrongType {
                    field: "fuel_info",
                    expected: "object",
                })
            }
        };

        // Metadata is written by the service only.
        if obj.contains_key("processing_metadata") {
            warn!("Discarding processing_metadata supplied in the extraction result");
        }

        Ok(InvoiceData {
            merchant_name: text(&obj, "merchant_name")?
                .map(|s| truncate("merchant_name", s, MAX_MERCHANT_NAME)),
            transaction_date,
            transaction_time,
            total_amount: parse_amount("total_amount", obj.get("total_amount"))?,
            tax_amount: parse_amount("tax_amount", obj.get("tax_amount"))?,
            subtotal: parse_amount("subtotal", obj.get("subtotal"))?,
            items,
            fuel_info,
            invoice_number: text(&obj, "invoice_number")?
                .map(|s| truncate("invoice_number", s, MAX_INVOICE_NUMBER)),
            payment_method: text(&obj, "payment_method")?.map(|s| PaymentMethod::from_label(&s)),
            currency,
            confidence_score: Some(confidence_score),
            processing_metadata: Map::new(),
        })
    }
}

/// Coerce a JSON number or printed string into a non-negative amount.
/// `null`, absent, and blank strings are `None`.
pub fn parse_amount(field: &'static str, value: Option<&Value>) -> Result<Option<Decimal>, SchemaError> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => parse_amount_str(&n.to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => parse_amount_str(s),
        Some(other) => {
            return Err(SchemaError::InvalidAmount {
                field,
                value: other.to_string(),
            })
        }
    };
    let amount = parsed.ok_or_else(|| SchemaError::InvalidAmount {
        field,
        value: value.map(Value::to_string).unwrap_or_default(),
    })?;
    non_negative(field, amount).map(Some)
}

fn validate_item(value: &Value) -> Result<ExpenseItem, SchemaError> {
    let obj = value.as_object().ok_or(SchemaError::NotAnObject(type_name(value)))?;
    // Models sometimes answer with "name" despite being told otherwise.
    let name = text(obj, "item_name")?
        .or(text(obj, "name")?)
        .ok_or(SchemaError::Empty { field: "item_name" })?;
    if name.chars().count() > MAX_ITEM_NAME {
        return Err(SchemaError::TooLong {
            field: "item_name",
            max: MAX_ITEM_NAME,
        });
    }
    Ok(ExpenseItem {
        item_name: name,
        quantity: parse_amount("quantity", obj.get("quantity"))?,
        unit_price: parse_amount("unit_price", obj.get("unit_price"))?,
        total_price: parse_amount("total_price", obj.get("total_price"))?,
        category: text(obj, "category")?
            .map(|s| ExpenseCategory::from_label(&s))
            .unwrap_or_default(),
    })
}

fn validate_fuel(obj: &Map<String, Value>) -> Result<FuelInfo, SchemaError> {
    Ok(FuelInfo {
        fuel_type: text(obj, "fuel_type")?.map(|s| FuelType::from_label(&s)),
        gallons_filled: parse_amount("gallons_filled", obj.get("gallons_filled"))?,
        price_per_gallon: parse_amount("price_per_gallon", obj.get("price_per_gallon"))?,
    })
}

/// Trimmed, non-empty string field. Numbers are accepted and stringified
/// (invoice numbers often come back as integers).
fn text(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, SchemaError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(SchemaError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn truncate(field: &'static str, value: String, max: usize) -> String {
    if value.chars().count() <= max {
        return value;
    }
    warn!(field, max, "Truncating over-long field");
    value.chars().take(max).collect()
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn full_receipt() {
        let raw = json!({
            "merchant_name": "  Shell Station #42 ",
            "transaction_date": "01/15/2024",
            "transaction_time": "5:52 PM",
            "total_amount": "$45.67",
            "tax_amount": 3.17,
            "subtotal": 42.5,
            "items": [
                {"item_name": "Regular Unleaded", "quantity": 10.5, "unit_price": 3.999, "total_price": 41.99, "category": "fuel"},
                {"item_name": "Gum", "total_price": "0.51", "category": "snacks"}
            ],
            "fuel_info": {"fuel_type": "regular", "gallons_filled": 10.5, "price_per_gallon": 3.999},
            "invoice_number": 10023,
            "payment_method": "VISA ending 1234",
            "currency": "usd",
            "confidence_score": 0.92
        });
        let inv = SchemaValidator::validate(raw).unwrap();

        assert_eq!(inv.merchant_name.as_deref(), Some("Shell Station #42"));
        assert_eq!(inv.transaction_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(inv.transaction_time, NaiveTime::from_hms_opt(17, 52, 0));
        assert_eq!(inv.total_amount, Some(dec("45.67")));
        assert_eq!(inv.tax_amount, Some(dec("3.17")));
        assert_eq!(inv.items.len(), 2);
        assert_eq!(inv.items[0].category, ExpenseCategory::Fuel);
        assert_eq!(inv.items[1].category, ExpenseCategory::Other);
        assert_eq!(inv.items[0].unit_price, Some(dec("3.999")));
        let fuel = inv.fuel_info.unwrap();
        assert_eq!(fuel.fuel_type, Some(FuelType::Gasoline));
        assert_eq!(inv.invoice_number.as_deref(), Some("10023"));
        assert_eq!(inv.payment_method, Some(PaymentMethod::CreditCard));
        assert_eq!(inv.currency, "USD");
        assert_eq!(inv.confidence_score, Some(0.92));
    }

    #[test]
    fn data_wrapper_is_unwrapped() {
        let inv = SchemaValidator::validate(json!({"data": {"total_amount": 10}})).unwrap();
        assert_eq!(inv.total_amount, Some(dec("10")));
    }

    #[test]
    fn missing_confidence_defaults() {
        let inv = SchemaValidator::validate(json!({"merchant_name": "Cafe"})).unwrap();
        assert_eq!(inv.confidence_score, Some(0.8));
        assert_eq!(inv.currency, "USD");
    }

    #[test]
    fn unrecognized_object_is_rejected() {
        assert_eq!(
            SchemaValidator::validate(json!({"invalid": "data"})),
            Err(SchemaError::NoRecognizedFields)
        );
        assert_eq!(
            SchemaValidator::validate(json!([1, 2])),
            Err(SchemaError::NotAnObject("array"))
        );
    }

    #[test]
    fn three_decimal_tax_is_kept() {
        let inv = SchemaValidator::validate(json!({"tax_amount": ".074"})).unwrap();
        assert_eq!(inv.tax_amount, Some(dec("0.074")));
    }

    #[test]
    fn negative_amount_fails_the_record() {
        let err = SchemaValidator::validate(json!({"total_amount": -5})).unwrap_err();
        assert!(matches!(err, SchemaError::Negative { field: "total_amount", .. }));

        let err = SchemaValidator::validate(json!({"subtotal": "(5.00)"})).unwrap_err();
        assert!(matches!(err, SchemaError::Negative { field: "subtotal", .. }));
    }

    #[test]
    fn confidence_out_of_range_fails() {
        let err = SchemaValidator::validate(json!({"total_amount": 1, "confidence_score": 1.5}))
            .unwrap_err();
        assert_eq!(err, SchemaError::ConfidenceOutOfRange(1.5));
    }

    #[test]
    fn bad_date_fails_the_record() {
        let err = SchemaValidator::validate(json!({"transaction_date": "someday"})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDate(_)));
    }

    #[test]
    fn invalid_items_are_dropped_individually() {
        let inv = SchemaValidator::validate(json!({
            "items": [
                {"item_name": "Milk", "total_price": 3.49},
                {"item_name": "", "total_price": 1.00},
                {"item_name": "Refund", "total_price": -2.00},
                "not an item",
                {"name": "Bread", "total_price": 2.99}
            ]
        }))
        .unwrap();
        let names: Vec<_> = inv.items.iter().map(|i| i.item_name.as_str()).collect();
        assert_eq!(names, ["Milk", "Bread"]);
    }

    #[test]
    fn supplied_processing_metadata_is_discarded() {
        let inv = SchemaValidator::validate(json!({
            "total_amount": 8.18,
            "processing_metadata": {"model_used": "spoofed", "admin": true}
        }))
        .unwrap();
        assert!(inv.processing_metadata.is_empty());
    }

    #[test]
    fn metadata_alone_is_not_a_result() {
        let err = SchemaValidator::validate(json!({"processing_metadata": {"a": 1}})).unwrap_err();
        assert!(matches!(err, SchemaError::NoRecognizedFields));
    }

    #[test]
    fn blank_strings_are_null() {
        let inv = SchemaValidator::validate(json!({
            "merchant_name": "   ",
            "total_amount": "",
            "payment_method": null
        }))
        .unwrap();
        assert_eq!(inv.merchant_name, None);
        assert_eq!(inv.total_amount, None);
        assert_eq!(inv.payment_method, None);
    }

    #[test]
    fn empty_fuel_info_becomes_none() {
        let inv = SchemaValidator::validate(json!({
            "total_amount": 40,
            "fuel_info": {"fuel_type": null, "gallons_filled": null}
        }))
        .unwrap();
        assert_eq!(inv.fuel_info, None);
    }

    #[test]
    fn long_merchant_name_is_truncated() {
        let long = "x".repeat(250);
        let inv = SchemaValidator::validate(json!({"merchant_name": long})).unwrap();
        assert_eq!(inv.merchant_name.unwrap().chars().count(), MAX_MERCHANT_NAME);
    }

    #[test]
    fn garbage_amount_is_an_error() {
        let err = SchemaValidator::validate(json!({"total_amount": "about ten"})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAmount { field: "total_amount", .. }));
        assert!(parse_amount("subtotal", Some(&json!(true))).is_err());
    }
}
