use crate::config::Settings;
use crate::domain::sales::CLOSED_STATUS;
use crate::error::{PipelineError, PipelineResult};
use crate::source::{bounded, Grouping, SalesSource, SourceQuery, SourceRows, SourceValue};
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgColumn, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, QueryBuilder, Row, TypeInfo};
use std::time::{Duration, Instant};

const FACT_TABLE: &str = "fct_sales";

/// Warehouse reader over a Postgres-compatible `fct_sales` table.
#[derive(Debug, Clone)]
pub struct PgSalesSource {
    pool: PgPool,
    table: String,
    timeout: Duration,
}

impl PgSalesSource {
    /// Builds a lazily connecting pool; connection failures surface on the
    /// first query as `SourceUnavailable`.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings.require_warehouse_database_url()?;
        let timeout = settings.source_timeout();

        let pool = PgPoolOptions::new()
            .max_connections(settings.warehouse_max_connections.max(1))
            .acquire_timeout(timeout)
            .connect_lazy(url)
            .context("invalid WAREHOUSE_DATABASE_URL")?;

        Self::from_pool(pool, &settings.warehouse_schema, timeout)
    }

    pub fn from_pool(pool: PgPool, schema: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            pool,
            table: qualified_table(schema)?,
            timeout,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait::async_trait]
impl SalesSource for PgSalesSource {
    fn source_name(&self) -> &'static str {
        "postgres"
    }

    async fn query(&self, query: &SourceQuery) -> PipelineResult<SourceRows> {
        let t0 = Instant::now();
        let mut qb = build_query(&self.table, query);
        let pool = &self.pool;

        let pg_rows = bounded(self.timeout, async move {
            qb.build()
                .persistent(false)
                .fetch_all(pool)
                .await
                .map_err(PipelineError::from)
        })
        .await?;

        let mut out = SourceRows::new(query.grouping);
        out.rows.reserve(pg_rows.len());
        for row in &pg_rows {
            out.rows.push(decode_row(row)?);
        }

        tracing::debug!(
            grouping = ?query.grouping,
            product_filter = query.product.is_some(),
            since = ?query.since,
            rows = out.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "warehouse query finished"
        );
        Ok(out)
    }
}

fn qualified_table(schema: &str) -> anyhow::Result<String> {
    let schema = schema.trim();
    anyhow::ensure!(
        is_plain_identifier(schema),
        "WAREHOUSE_SCHEMA must be a plain SQL identifier (got {schema:?})"
    );
    Ok(format!("{schema}.{FACT_TABLE}"))
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Filter values only ever enter the statement through `push_bind`.
pub(crate) fn build_query<'a>(table: &str, query: &'a SourceQuery) -> QueryBuilder<'a, Postgres> {
    let amount = "COALESCE(amount, 0)";
    let closed = format!("CASE WHEN status = '{CLOSED_STATUS}' THEN {amount} ELSE 0 END");
    let open = format!("CASE WHEN status = '{CLOSED_STATUS}' THEN 0 ELSE {amount} END");

    let select = match query.grouping {
        Grouping::Facts => "SELECT product, region, amount, status, sale_date".to_string(),
        Grouping::Region => format!(
            "SELECT COALESCE(region, '') AS region, SUM({amount}) AS total_amount, \
             COUNT(*) AS deal_count, AVG({amount}) AS avg_deal_size, \
             SUM({closed}) AS closed_amount, SUM({open}) AS open_amount"
        ),
        Grouping::Product => format!(
            "SELECT COALESCE(product, '') AS product, SUM({amount}) AS total_amount, \
             COUNT(*) AS deal_count, AVG({amount}) AS avg_deal_size"
        ),
        Grouping::ProductRegion => format!(
            "SELECT COALESCE(product, '') AS product, COALESCE(region, '') AS region, \
             SUM({amount}) AS total_amount, COUNT(*) AS deal_count, SUM({closed}) AS closed_amount"
        ),
    };

    let mut qb = QueryBuilder::new(select);
    qb.push(format!(" FROM {table} WHERE TRUE"));

    if let Some(product) = query.product.as_deref() {
        qb.push(" AND product = ").push_bind(product);
    }
    if let Some(since) = query.since {
        qb.push(" AND sale_date >= ").push_bind(since);
    }

    match query.grouping {
        Grouping::Facts => {}
        Grouping::Region => {
            qb.push(" GROUP BY COALESCE(region, '') ORDER BY total_amount DESC, region ASC");
        }
        Grouping::Product => {
            qb.push(" GROUP BY COALESCE(product, '') ORDER BY total_amount DESC, product ASC");
        }
        Grouping::ProductRegion => {
            qb.push(
                " GROUP BY COALESCE(product, ''), COALESCE(region, '') \
                 ORDER BY total_amount DESC, product ASC, region ASC",
            );
        }
    }

    qb
}

fn decode_row(row: &PgRow) -> PipelineResult<Vec<SourceValue>> {
    row.columns()
        .iter()
        .map(|col| decode_cell(row, col))
        .collect()
}

fn decode_cell(row: &PgRow, col: &PgColumn) -> PipelineResult<SourceValue> {
    let idx = col.ordinal();
    let value = match col.type_info().name() {
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| SourceValue::Int(v.into())),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|v| SourceValue::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(SourceValue::Int),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|v| SourceValue::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(SourceValue::Float),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(idx)?.map(SourceValue::Decimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(idx)?.map(SourceValue::Text)
        }
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx)?.map(SourceValue::Date),
        other => {
            return Err(PipelineError::QueryError(format!(
                "unsupported column type {other} for column {}",
                col.name()
            )))
        }
    };
    Ok(value.unwrap_or(SourceValue::Null))
}
