use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Published by-region row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub region: String,
    pub total_amount: f64,
    pub deal_count: i64,
    pub avg_deal_size: Option<f64>,
    pub closed_amount: f64,
    pub open_amount: f64,
}

/// Published by-product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product: String,
    pub total_amount: f64,
    pub deal_count: i64,
    pub avg_deal_size: Option<f64>,
}

/// Converts an exact source amount into the plain float used in every
/// published payload.
pub fn to_float(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `None` when there is nothing to average over.
pub fn average(total: Decimal, count: i64) -> Option<f64> {
    if count <= 0 {
        return None;
    }
    total.checked_div(Decimal::from(count)).map(to_float)
}
