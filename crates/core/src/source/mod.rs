use crate::error::{PipelineError, PipelineResult};
use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

pub mod memory;
pub mod postgres;

pub use memory::MemorySalesSource;
pub use postgres::PgSalesSource;

/// Shape of rows a query asks the source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// Raw fact rows, no aggregation.
    Facts,
    Region,
    Product,
    ProductRegion,
}

impl Grouping {
    /// Column names the source returns for this grouping, in order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Grouping::Facts => &["product", "region", "amount", "status", "sale_date"],
            Grouping::Region => &[
                "region",
                "total_amount",
                "deal_count",
                "avg_deal_size",
                "closed_amount",
                "open_amount",
            ],
            Grouping::Product => &["product", "total_amount", "deal_count", "avg_deal_size"],
            Grouping::ProductRegion => &[
                "product",
                "region",
                "total_amount",
                "deal_count",
                "closed_amount",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub grouping: Grouping,
    /// Exact, case-sensitive product match.
    pub product: Option<String>,
    /// Inclusive lower bound on `sale_date`.
    pub since: Option<NaiveDate>,
}

impl SourceQuery {
    pub fn facts() -> Self {
        Self::grouped(Grouping::Facts)
    }

    pub fn grouped(grouping: Grouping) -> Self {
        Self {
            grouping,
            product: None,
            since: None,
        }
    }

    pub fn with_product(mut self, product: Option<String>) -> Self {
        self.product = product;
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }
}

/// One cell as the source engine returned it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
}

impl SourceValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SourceValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SourceValue::Decimal(d) => Some(*d),
            SourceValue::Int(i) => Some(Decimal::from(*i)),
            SourceValue::Float(f) => Decimal::from_f64(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SourceValue::Int(i) => Some(*i),
            SourceValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SourceValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// JSON form with every non-integer number coerced to a plain float.
    pub fn normalized(&self) -> Value {
        match self {
            SourceValue::Null => Value::Null,
            SourceValue::Int(i) => Value::from(*i),
            SourceValue::Float(f) => float_value(*f),
            SourceValue::Decimal(d) => d.to_f64().map(float_value).unwrap_or(Value::Null),
            SourceValue::Text(s) => Value::String(s.clone()),
            SourceValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Tabular result of a source query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SourceValue>>,
}

impl SourceRows {
    pub fn new(grouping: Grouping) -> Self {
        Self {
            columns: grouping.columns().iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

#[async_trait::async_trait]
pub trait SalesSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn query(&self, query: &SourceQuery) -> PipelineResult<SourceRows>;
}

/// Runs a source call under a deadline; expiry counts as the source being
/// unavailable.
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(PipelineError::SourceUnavailable(format!(
            "source query timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
