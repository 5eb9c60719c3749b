use crate::aggregate::normalize_rows;
use crate::error::PipelineResult;
use crate::source::{Grouping, SalesSource, SourceQuery};
use crate::time::window::TrailingWindow;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Sentinel product value meaning "do not filter".
pub const ALL_PRODUCTS: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductFilter {
    All,
    Exact(String),
}

impl ProductFilter {
    /// Absent, empty and `"All"` select every product; anything else is an
    /// exact, case-sensitive match.
    pub fn from_param(product: Option<&str>) -> Self {
        match product {
            None | Some("") | Some(ALL_PRODUCTS) => ProductFilter::All,
            Some(p) => ProductFilter::Exact(p.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ProductFilter::All => ALL_PRODUCTS,
            ProductFilter::Exact(p) => p,
        }
    }

    fn as_bind(&self) -> Option<String> {
        match self {
            ProductFilter::All => None,
            ProductFilter::Exact(p) => Some(p.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastMonthSales {
    pub filter: ProductFilter,
    pub since: NaiveDate,
    pub rows: Vec<Map<String, Value>>,
}

/// Live product x region totals for the trailing month. Rows are ordered by
/// total descending, then product and region by byte order, whatever order
/// the source returned them in.
pub async fn last_month_sales(
    source: &dyn SalesSource,
    filter: ProductFilter,
    today: NaiveDate,
) -> PipelineResult<LastMonthSales> {
    let since = TrailingWindow::LAST_MONTH.cutoff(today);
    let query = SourceQuery::grouped(Grouping::ProductRegion)
        .with_product(filter.as_bind())
        .since(since);

    let rows = source.query(&query).await?;
    tracing::debug!(
        source = source.source_name(),
        filter = filter.label(),
        %since,
        rows = rows.len(),
        "ad-hoc last-month query"
    );

    let mut out = normalize_rows(&rows);
    out.sort_by(by_total_then_product_region);

    Ok(LastMonthSales {
        rows: out,
        filter,
        since,
    })
}

fn total(row: &Map<String, Value>) -> f64 {
    row.get("total_amount").and_then(Value::as_f64).unwrap_or(0.0)
}

fn key<'a>(row: &'a Map<String, Value>, column: &str) -> &'a str {
    row.get(column).and_then(Value::as_str).unwrap_or("")
}

fn by_total_then_product_region(a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    total(b)
        .total_cmp(&total(a))
        .then_with(|| key(a, "product").cmp(key(b, "product")))
        .then_with(|| key(a, "region").cmp(key(b, "region")))
}
