use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::category::ExpenseCategory;
use crate::normalize::hhmm;
use crate::payment::PaymentMethod;

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

pub const MAX_MERCHANT_NAME: usize = 200;
pub const MAX_ITEM_NAME: usize = 200;
pub const MAX_INVOICE_NUMBER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Gasoline,
    Diesel,
    Electric,
    Hybrid,
    Other,
}

impl FuelType {
    pub const ALL: [FuelType; 5] = [
        FuelType::Gasoline,
        FuelType::Diesel,
        FuelType::Electric,
        FuelType::Hybrid,
        FuelType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FuelType::Gasoline => "gasoline",
            FuelType::Diesel => "diesel",
            FuelType::Electric => "electric",
            FuelType::Hybrid => "hybrid",
            FuelType::Other => "other",
        }
    }

    /// Pump labels ("Regular Unleaded", "PETROL") onto a fuel type.
    pub fn from_label(label: &str) -> Self {
        let key = label.trim().to_lowercase();
        if let Some(t) = Self::ALL.iter().find(|t| t.as_str() == key) {
            return *t;
        }
        if key.contains("diesel") {
            FuelType::Diesel
        } else if key.contains("electric") || key.contains("ev charg") || key.contains("kwh") {
            FuelType::Electric
        } else if key.contains("hybrid") {
            FuelType::Hybrid
        } else if ["gas", "petrol", "unleaded", "regular", "premium", "super", "plus"]
            .iter()
            .any(|k| key.contains(k))
        {
            FuelType::Gasoline
        } else {
            FuelType::Other
        }
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseItem {
    pub item_name: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub quantity: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub unit_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub category: ExpenseCategory,
}

impl ExpenseItem {
    pub fn new(item_name: impl Into<String>) -> Self {
        ExpenseItem {
            item_name: item_name.into(),
            quantity: None,
            unit_price: None,
            total_price: None,
            category: ExpenseCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FuelInfo {
    pub fuel_type: Option<FuelType>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub gallons_filled: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub price_per_gallon: Option<Decimal>,
}

impl FuelInfo {
    pub fn is_empty(&self) -> bool {
        self.fuel_type.is_none() && self.gallons_filled.is_none() && self.price_per_gallon.is_none()
    }
}

/// A validated invoice or receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvoiceData {
    pub merchant_name: Option<String>,
    /// `YYYY-MM-DD`
    pub transaction_date: Option<NaiveDate>,
    /// `HH:MM`, 24-hour clock
    #[serde(default, with = "hhmm")]
    #[schemars(with = "Option<String>")]
    pub transaction_time: Option<NaiveTime>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub total_amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub tax_amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schemars(with = "Option<f64>")]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<ExpenseItem>,
    pub fuel_info: Option<FuelInfo>,
    pub invoice_number: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub currency: String,
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub processing_metadata: Map<String, Value>,
}

impl Default for InvoiceData {
    fn default() -> Self {
        InvoiceData {
            merchant_name: None,
            transaction_date: None,
            transaction_time: None,
            total_amount: None,
            tax_amount: None,
            subtotal: None,
            items: Vec::new(),
            fuel_info: None,
            invoice_number: None,
            payment_method: None,
            currency: DEFAULT_CURRENCY.to_string(),
            confidence_score: Some(DEFAULT_CONFIDENCE),
            processing_metadata: Map::new(),
        }
    }
}

impl InvoiceData {
    pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.processing_metadata.insert(key.to_string(), value.into());
    }
}
