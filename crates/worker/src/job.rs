use anyhow::Context;
use revops_core::config::Settings;
use revops_core::pipeline::{self, AggregationMode};
use revops_core::publish::Publisher;
use revops_core::source::{PgSalesSource, SalesSource};

/// One scheduled invocation. The warehouse pool is closed before returning,
/// whether or not the run succeeded.
pub async fn run(settings: &Settings, mode: AggregationMode, dry_run: bool) -> anyhow::Result<()> {
    let publisher = if dry_run {
        None
    } else {
        let bucket = settings.require_output_bucket()?;
        let store = revops_core::blob::from_settings(settings).await?;
        Some(Publisher::new(store, bucket))
    };

    let source = PgSalesSource::from_settings(settings)?;
    let result = execute(&source, publisher.as_ref(), mode).await;
    source.close().await;
    result
}

pub async fn execute(
    source: &dyn SalesSource,
    publisher: Option<&Publisher>,
    mode: AggregationMode,
) -> anyhow::Result<()> {
    let Some(publisher) = publisher else {
        let extract = pipeline::extract(source, mode)
            .await
            .context("dry run failed")?;
        tracing::info!(
            dry_run = true,
            rows_read = extract.rows_read,
            regions = extract.aggregates.by_region.len(),
            products = extract.aggregates.by_product.len(),
            "dry run finished; nothing published"
        );
        return Ok(());
    };

    let report = pipeline::run(source, publisher, mode)
        .await
        .context("pipeline run failed")?;

    let raw = serde_json::to_string(&report).context("serialize run report failed")?;
    tracing::info!(run_id = %report.run_id, report = %raw, "run report");

    if !report.is_complete() {
        let failed: Vec<String> = report
            .failures()
            .into_iter()
            .map(|(set, error)| format!("{set}: {error}"))
            .collect();
        anyhow::bail!(
            "pipeline run {} left stale snapshots ({})",
            report.run_id,
            failed.join("; ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use revops_core::blob::{BlobStore, MemoryBlobStore};
    use revops_core::domain::sales::{FactRecord, ResultSet};
    use revops_core::source::MemorySalesSource;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn source() -> MemorySalesSource {
        MemorySalesSource::new(vec![FactRecord {
            product: "Widget".to_string(),
            region: "US".to_string(),
            amount: Decimal::from(100),
            status: "Closed".to_string(),
            sale_date: NaiveDate::from_ymd_opt(2026, 10, 1),
        }])
    }

    #[tokio::test]
    async fn dry_run_publishes_nothing() {
        execute(&source(), None, AggregationMode::InProcess)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_run_writes_both_snapshots() {
        let store = Arc::new(MemoryBlobStore::new());
        let publisher = Publisher::new(store.clone(), "b");

        execute(&source(), Some(&publisher), AggregationMode::Pushdown)
            .await
            .unwrap();

        for set in ResultSet::ALL {
            assert!(store.get("b", &set.object_key()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn partial_publish_fails_the_job() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_writes_to(&ResultSet::ByProduct.object_key());
        let publisher = Publisher::new(store.clone(), "b");

        let err = execute(&source(), Some(&publisher), AggregationMode::InProcess)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("by-product"));
        assert!(store.get("b", &ResultSet::ByRegion.object_key()).await.is_ok());
    }
}
