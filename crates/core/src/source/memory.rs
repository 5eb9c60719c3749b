use crate::aggregate::{by_product_region, group_by, GroupTotals};
use crate::domain::sales::FactRecord;
use crate::error::PipelineResult;
use crate::source::{Grouping, SalesSource, SourceQuery, SourceRows, SourceValue};

/// In-process fact table. Evaluates queries the way the warehouse does so the
/// rest of the pipeline can run without a database.
#[derive(Debug, Clone, Default)]
pub struct MemorySalesSource {
    facts: Vec<FactRecord>,
}

impl MemorySalesSource {
    pub fn new(facts: Vec<FactRecord>) -> Self {
        Self { facts }
    }

    fn matching(&self, query: &SourceQuery) -> Vec<FactRecord> {
        self.facts
            .iter()
            .filter(|f| query.product.as_deref().map_or(true, |p| f.product == p))
            .filter(|f| {
                query
                    .since
                    .map_or(true, |d| f.sale_date.is_some_and(|day| day >= d))
            })
            .cloned()
            .collect()
    }
}

fn text(s: String) -> SourceValue {
    SourceValue::Text(s)
}

fn totals_row(key: Vec<SourceValue>, t: &GroupTotals, tail: &[Column]) -> Vec<SourceValue> {
    let mut row = key;
    row.push(SourceValue::Decimal(t.total));
    row.push(SourceValue::Int(t.count));
    for col in tail {
        row.push(match col {
            Column::Avg => t.average().map_or(SourceValue::Null, SourceValue::Decimal),
            Column::Closed => SourceValue::Decimal(t.closed),
            Column::Open => SourceValue::Decimal(t.open),
        });
    }
    row
}

enum Column {
    Avg,
    Closed,
    Open,
}

#[async_trait::async_trait]
impl SalesSource for MemorySalesSource {
    fn source_name(&self) -> &'static str {
        "memory"
    }

    async fn query(&self, query: &SourceQuery) -> PipelineResult<SourceRows> {
        let facts = self.matching(query);
        let mut out = SourceRows::new(query.grouping);

        out.rows = match query.grouping {
            Grouping::Facts => facts
                .into_iter()
                .map(|f| {
                    vec![
                        text(f.product),
                        text(f.region),
                        SourceValue::Decimal(f.amount),
                        text(f.status),
                        f.sale_date.map_or(SourceValue::Null, SourceValue::Date),
                    ]
                })
                .collect(),
            Grouping::Region => group_by(&facts, |f| f.region.clone())?
                .into_iter()
                .map(|(region, t)| {
                    totals_row(vec![text(region)], &t, &[Column::Avg, Column::Closed, Column::Open])
                })
                .collect(),
            Grouping::Product => group_by(&facts, |f| f.product.clone())?
                .into_iter()
                .map(|(product, t)| totals_row(vec![text(product)], &t, &[Column::Avg]))
                .collect(),
            Grouping::ProductRegion => by_product_region(&facts)?
                .into_iter()
                .map(|((product, region), t)| {
                    totals_row(vec![text(product), text(region)], &t, &[Column::Closed])
                })
                .collect(),
        };

        Ok(out)
    }
}
