use crate::domain::contract;
use crate::domain::sales::FactRecord;
use crate::domain::summary::{average, to_float, ProductSummary, RegionSummary};
use crate::error::{PipelineError, PipelineResult};
use crate::source::SourceRows;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Exact running totals for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTotals {
    pub total: Decimal,
    pub count: i64,
    pub closed: Decimal,
    pub open: Decimal,
}

impl GroupTotals {
    fn add(&mut self, fact: &FactRecord) -> PipelineResult<()> {
        self.total = checked_sum(self.total, fact.amount)?;
        self.count += 1;
        if fact.is_closed() {
            self.closed = checked_sum(self.closed, fact.amount)?;
        } else {
            self.open = checked_sum(self.open, fact.amount)?;
        }
        Ok(())
    }

    pub fn average(&self) -> Option<Decimal> {
        if self.count <= 0 {
            return None;
        }
        self.total.checked_div(Decimal::from(self.count))
    }
}

fn checked_sum(acc: Decimal, amount: Decimal) -> PipelineResult<Decimal> {
    acc.checked_add(amount).ok_or_else(|| {
        PipelineError::QueryError(format!("amount total overflowed adding {amount} to {acc}"))
    })
}

/// Both published result sets of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub by_region: Vec<RegionSummary>,
    pub by_product: Vec<ProductSummary>,
}

/// Groups facts by `key`; output is ordered by total descending, then key
/// ascending. Only keys that occur in `facts` appear. A group whose sums leave
/// the `Decimal` range fails the whole call.
pub fn group_by<K, F>(facts: &[FactRecord], key: F) -> PipelineResult<Vec<(K, GroupTotals)>>
where
    K: Ord,
    F: Fn(&FactRecord) -> K,
{
    let mut groups: BTreeMap<K, GroupTotals> = BTreeMap::new();
    for fact in facts {
        groups.entry(key(fact)).or_default().add(fact)?;
    }

    let mut out: Vec<(K, GroupTotals)> = groups.into_iter().collect();
    out.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(&b.0)));
    Ok(out)
}

pub fn by_region(facts: &[FactRecord]) -> PipelineResult<Vec<RegionSummary>> {
    let groups = group_by(facts, |f| f.region.clone())?;
    Ok(groups
        .into_iter()
        .map(|(region, t)| RegionSummary {
            region,
            total_amount: to_float(t.total),
            deal_count: t.count,
            avg_deal_size: average(t.total, t.count),
            closed_amount: to_float(t.closed),
            open_amount: to_float(t.open),
        })
        .collect())
}

pub fn by_product(facts: &[FactRecord]) -> PipelineResult<Vec<ProductSummary>> {
    let groups = group_by(facts, |f| f.product.clone())?;
    Ok(groups
        .into_iter()
        .map(|(product, t)| ProductSummary {
            product,
            total_amount: to_float(t.total),
            deal_count: t.count,
            avg_deal_size: average(t.total, t.count),
        })
        .collect())
}

pub fn by_product_region(
    facts: &[FactRecord],
) -> PipelineResult<Vec<((String, String), GroupTotals)>> {
    group_by(facts, |f| (f.product.clone(), f.region.clone()))
}

pub fn aggregate(facts: &[FactRecord]) -> PipelineResult<Aggregates> {
    Ok(Aggregates {
        by_region: by_region(facts)?,
        by_product: by_product(facts)?,
    })
}

/// Builds the result sets from rows the source already grouped, applying the
/// same ordering as [`aggregate`].
pub fn from_pushdown(region_rows: &SourceRows, product_rows: &SourceRows) -> PipelineResult<Aggregates> {
    let mut by_region = contract::region_summaries_from_rows(region_rows)?;
    let mut by_product = contract::product_summaries_from_rows(product_rows)?;

    by_region.sort_by(|a, b| by_total_then_key(a.total_amount, &a.region, b.total_amount, &b.region));
    by_product
        .sort_by(|a, b| by_total_then_key(a.total_amount, &a.product, b.total_amount, &b.product));

    Ok(Aggregates {
        by_region,
        by_product,
    })
}

fn by_total_then_key(a_total: f64, a_key: &str, b_total: f64, b_key: &str) -> Ordering {
    b_total.total_cmp(&a_total).then_with(|| a_key.cmp(b_key))
}

/// Turns source rows into JSON objects keyed by column name, with numeric
/// cells normalized to plain floats.
pub fn normalize_rows(rows: &SourceRows) -> Vec<Map<String, Value>> {
    rows.rows
        .iter()
        .map(|row| {
            rows.columns
                .iter()
                .zip(row.iter())
                .map(|(col, cell)| (col.to_ascii_lowercase(), cell.normalized()))
                .collect()
        })
        .collect()
}
