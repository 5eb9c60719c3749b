use crate::aggregate::{self, Aggregates};
use crate::domain::contract;
use crate::domain::sales::ResultSet;
use crate::error::PipelineResult;
use crate::publish::{PublishReceipt, Publisher};
use crate::source::{Grouping, SalesSource, SourceQuery};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// Where the group-by happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationMode {
    /// Fetch fact rows and aggregate here.
    #[default]
    InProcess,
    /// Let the source group and only decode its rows.
    Pushdown,
}

#[derive(Debug, Clone)]
pub struct Extract {
    pub rows_read: usize,
    pub aggregates: Aggregates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published {
        key: String,
        records: usize,
        bytes: usize,
    },
    Failed {
        error: String,
    },
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }
}

impl From<PipelineResult<PublishReceipt>> for PublishOutcome {
    fn from(res: PipelineResult<PublishReceipt>) -> Self {
        match res {
            Ok(r) => PublishOutcome::Published {
                key: r.key,
                records: r.records,
                bytes: r.bytes,
            },
            Err(e) => PublishOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: AggregationMode,
    pub rows_read: usize,
    pub regions: usize,
    pub products: usize,
    pub by_region: PublishOutcome,
    pub by_product: PublishOutcome,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.by_region.is_published() && self.by_product.is_published()
    }

    pub fn failures(&self) -> Vec<(ResultSet, &str)> {
        [
            (ResultSet::ByRegion, &self.by_region),
            (ResultSet::ByProduct, &self.by_product),
        ]
        .into_iter()
        .filter_map(|(set, outcome)| match outcome {
            PublishOutcome::Failed { error } => Some((set, error.as_str())),
            PublishOutcome::Published { .. } => None,
        })
        .collect()
    }
}

/// Reads from the source and builds both result sets. Nothing is written.
pub async fn extract(source: &dyn SalesSource, mode: AggregationMode) -> PipelineResult<Extract> {
    let t0 = Instant::now();
    let extract = match mode {
        AggregationMode::InProcess => {
            let rows = source.query(&SourceQuery::facts()).await?;
            let facts = contract::facts_from_rows(&rows)?;
            Extract {
                rows_read: rows.len(),
                aggregates: aggregate::aggregate(&facts)?,
            }
        }
        AggregationMode::Pushdown => {
            let region_rows = source.query(&SourceQuery::grouped(Grouping::Region)).await?;
            let product_rows = source.query(&SourceQuery::grouped(Grouping::Product)).await?;
            Extract {
                rows_read: region_rows.len() + product_rows.len(),
                aggregates: aggregate::from_pushdown(&region_rows, &product_rows)?,
            }
        }
    };

    tracing::info!(
        source = source.source_name(),
        ?mode,
        rows_read = extract.rows_read,
        regions = extract.aggregates.by_region.len(),
        products = extract.aggregates.by_product.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "aggregation finished"
    );
    Ok(extract)
}

/// Publishes both result sets. Each write is attempted regardless of how the
/// other one went.
pub async fn publish_all(
    publisher: &Publisher,
    aggregates: &Aggregates,
) -> (PublishOutcome, PublishOutcome) {
    let by_region: PublishOutcome = publisher
        .publish(ResultSet::ByRegion, &aggregates.by_region)
        .await
        .into();
    if let PublishOutcome::Failed { error } = &by_region {
        tracing::error!(result_set = %ResultSet::ByRegion, %error, "publish failed");
    }

    let by_product: PublishOutcome = publisher
        .publish(ResultSet::ByProduct, &aggregates.by_product)
        .await
        .into();
    if let PublishOutcome::Failed { error } = &by_product {
        tracing::error!(result_set = %ResultSet::ByProduct, %error, "publish failed");
    }

    (by_region, by_product)
}

/// One full extract, aggregate and publish cycle. A source failure returns
/// `Err` before anything is written; publish failures are reported per result
/// set in the returned report.
pub async fn run(
    source: &dyn SalesSource,
    publisher: &Publisher,
    mode: AggregationMode,
) -> PipelineResult<RunReport> {
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, ?mode, bucket = publisher.bucket(), "pipeline run started");

    let extract = match extract(source, mode).await {
        Ok(extract) => extract,
        Err(err) => {
            tracing::error!(%run_id, kind = err.kind(), error = %err, "pipeline run aborted");
            return Err(err);
        }
    };
    let (by_region, by_product) = publish_all(publisher, &extract.aggregates).await;

    let report = RunReport {
        run_id,
        mode,
        rows_read: extract.rows_read,
        regions: extract.aggregates.by_region.len(),
        products: extract.aggregates.by_product.len(),
        by_region,
        by_product,
    };

    if report.is_complete() {
        tracing::info!(%run_id, rows_read = report.rows_read, "pipeline run completed");
    } else {
        tracing::warn!(
            %run_id,
            failed = report.failures().len(),
            "pipeline run finished with failed publishes"
        );
    }
    Ok(report)
}
