use crate::domain::sales::FactRecord;
use crate::domain::summary::{average, to_float, ProductSummary, RegionSummary};
use crate::error::{PipelineError, PipelineResult};
use crate::source::{SourceRows, SourceValue};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

// Decoding of warehouse rows into domain types. Anything the source returns in
// an unexpected shape is reported as a QueryError.

fn invalid(detail: String) -> PipelineError {
    PipelineError::QueryError(format!("unexpected source row: {detail}"))
}

fn require_column(rows: &SourceRows, name: &str) -> PipelineResult<usize> {
    rows.column_index(name)
        .ok_or_else(|| invalid(format!("missing column {name}")))
}

fn cell<'a>(row: &'a [SourceValue], idx: usize, name: &str) -> PipelineResult<&'a SourceValue> {
    row.get(idx)
        .ok_or_else(|| invalid(format!("row too short for column {name}")))
}

/// NULL text decodes as the empty string.
fn text(row: &[SourceValue], idx: usize, name: &str) -> PipelineResult<String> {
    match cell(row, idx, name)? {
        SourceValue::Null => Ok(String::new()),
        v => v
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("{name} is not text: {v:?}"))),
    }
}

/// NULL amounts decode as zero.
fn amount(row: &[SourceValue], idx: usize, name: &str) -> PipelineResult<Decimal> {
    match cell(row, idx, name)? {
        SourceValue::Null => Ok(Decimal::ZERO),
        v => v
            .as_decimal()
            .ok_or_else(|| invalid(format!("{name} is not numeric: {v:?}"))),
    }
}

fn count(row: &[SourceValue], idx: usize, name: &str) -> PipelineResult<i64> {
    let v = cell(row, idx, name)?;
    let n = v
        .as_i64()
        .ok_or_else(|| invalid(format!("{name} is not an integer: {v:?}")))?;
    if n < 0 {
        return Err(invalid(format!("{name} is negative: {n}")));
    }
    Ok(n)
}

fn unique_key(seen: &mut BTreeSet<String>, key: &str, kind: &str) -> PipelineResult<()> {
    if !seen.insert(key.to_string()) {
        return Err(invalid(format!("duplicate {kind} {key:?}")));
    }
    Ok(())
}

pub fn facts_from_rows(rows: &SourceRows) -> PipelineResult<Vec<FactRecord>> {
    let product = require_column(rows, "product")?;
    let region = require_column(rows, "region")?;
    let amount_idx = require_column(rows, "amount")?;
    let status = require_column(rows, "status")?;
    let date_idx = require_column(rows, "sale_date")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows.rows {
        let sale_date = match cell(row, date_idx, "sale_date")? {
            SourceValue::Null => None,
            v => Some(
                v.as_date()
                    .ok_or_else(|| invalid(format!("sale_date is not a date: {v:?}")))?,
            ),
        };

        out.push(FactRecord {
            product: text(row, product, "product")?,
            region: text(row, region, "region")?,
            amount: amount(row, amount_idx, "amount")?,
            status: text(row, status, "status")?,
            sale_date,
        });
    }
    Ok(out)
}

pub fn region_summaries_from_rows(rows: &SourceRows) -> PipelineResult<Vec<RegionSummary>> {
    let region = require_column(rows, "region")?;
    let total = require_column(rows, "total_amount")?;
    let deals = require_column(rows, "deal_count")?;
    let closed = require_column(rows, "closed_amount")?;
    let open = require_column(rows, "open_amount")?;

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows.rows {
        let key = text(row, region, "region")?;
        unique_key(&mut seen, &key, "region")?;

        let total_amount = amount(row, total, "total_amount")?;
        let deal_count = count(row, deals, "deal_count")?;
        out.push(RegionSummary {
            region: key,
            total_amount: to_float(total_amount),
            deal_count,
            avg_deal_size: average(total_amount, deal_count),
            closed_amount: to_float(amount(row, closed, "closed_amount")?),
            open_amount: to_float(amount(row, open, "open_amount")?),
        });
    }
    Ok(out)
}

pub fn product_summaries_from_rows(rows: &SourceRows) -> PipelineResult<Vec<ProductSummary>> {
    let product = require_column(rows, "product")?;
    let total = require_column(rows, "total_amount")?;
    let deals = require_column(rows, "deal_count")?;

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows.rows {
        let key = text(row, product, "product")?;
        unique_key(&mut seen, &key, "product")?;

        let total_amount = amount(row, total, "total_amount")?;
        let deal_count = count(row, deals, "deal_count")?;
        out.push(ProductSummary {
            product: key,
            total_amount: to_float(total_amount),
            deal_count,
            avg_deal_size: average(total_amount, deal_count),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Grouping;
    use chrono::NaiveDate;

    fn fact_row(amount: SourceValue, status: SourceValue) -> Vec<SourceValue> {
        vec![
            SourceValue::Text("Widget".to_string()),
            SourceValue::Text("US".to_string()),
            amount,
            status,
            SourceValue::Date(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()),
        ]
    }

    #[test]
    fn decodes_facts_with_null_amount_and_status() {
        let mut rows = SourceRows::new(Grouping::Facts);
        rows.rows.push(fact_row(SourceValue::Null, SourceValue::Null));
        rows.rows.push(fact_row(
            SourceValue::Float(12.5),
            SourceValue::Text("Closed".to_string()),
        ));

        let facts = facts_from_rows(&rows).unwrap();
        assert_eq!(facts[0].amount, Decimal::ZERO);
        assert_eq!(facts[0].status, "");
        assert!(!facts[0].is_closed());
        assert_eq!(facts[1].amount, Decimal::new(125, 1));
        assert!(facts[1].is_closed());
    }

    #[test]
    fn rejects_missing_columns() {
        let rows = SourceRows {
            columns: vec!["product".to_string()],
            rows: Vec::new(),
        };
        let err = facts_from_rows(&rows).unwrap_err();
        assert!(matches!(err, PipelineError::QueryError(_)));
        assert!(err.to_string().contains("missing column region"));
    }

    #[test]
    fn null_sale_date_decodes_as_undated_fact() {
        let mut rows = SourceRows::new(Grouping::Facts);
        let mut row = fact_row(SourceValue::Int(100), SourceValue::Text("Closed".to_string()));
        row[4] = SourceValue::Null;
        rows.rows.push(row);

        let facts = facts_from_rows(&rows).unwrap();
        assert_eq!(facts[0].sale_date, None);
        assert_eq!(facts[0].amount, Decimal::from(100));
    }

    #[test]
    fn rejects_non_date_sale_date() {
        let mut rows = SourceRows::new(Grouping::Facts);
        let mut row = fact_row(SourceValue::Int(1), SourceValue::Null);
        row[4] = SourceValue::Text("yesterday".to_string());
        rows.rows.push(row);
        assert!(facts_from_rows(&rows).is_err());
    }

    #[test]
    fn rejects_duplicate_product_groups() {
        let mut rows = SourceRows::new(Grouping::Product);
        for _ in 0..2 {
            rows.rows.push(vec![
                SourceValue::Text("Widget".to_string()),
                SourceValue::Decimal(Decimal::from(10)),
                SourceValue::Int(1),
                SourceValue::Decimal(Decimal::from(10)),
            ]);
        }
        let err = product_summaries_from_rows(&rows).unwrap_err();
        assert!(err.to_string().contains("duplicate product"));
    }

    #[test]
    fn recomputes_average_from_total_and_count() {
        let mut rows = SourceRows::new(Grouping::Product);
        rows.rows.push(vec![
            SourceValue::Text("Widget".to_string()),
            SourceValue::Decimal(Decimal::from(90)),
            SourceValue::Int(4),
            SourceValue::Null,
        ]);
        let out = product_summaries_from_rows(&rows).unwrap();
        assert_eq!(out[0].avg_deal_size, Some(22.5));
    }

    #[test]
    fn rejects_negative_counts() {
        let mut rows = SourceRows::new(Grouping::Region);
        rows.rows.push(vec![
            SourceValue::Text("US".to_string()),
            SourceValue::Int(0),
            SourceValue::Int(-1),
            SourceValue::Null,
            SourceValue::Int(0),
            SourceValue::Int(0),
        ]);
        assert!(region_summaries_from_rows(&rows).is_err());
    }
}
