use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use revops_core::adhoc::{self, ProductFilter};
use revops_core::domain::sales::ResultSet;
use revops_core::snapshot::SnapshotReader;
use revops_core::source::SalesSource;
use revops_core::time::window::today_utc;
use revops_core::PipelineError;

#[derive(Clone)]
pub struct AppState {
    /// `None` when no output bucket is configured.
    pub snapshots: Option<SnapshotReader>,
    /// `None` when no warehouse is configured.
    pub source: Option<Arc<dyn SalesSource>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pipeline/by-region", get(get_pipeline_by_region))
        .route("/pipeline/by-product", get(get_pipeline_by_product))
        .route("/sales/last-month", get(get_last_month_sales))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct Success<T> {
    status: &'static str,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
}

impl<T> Success<T> {
    fn new(data: T) -> Self {
        Self {
            status: "success",
            data,
            filter: None,
        }
    }
}

/// Every failure on the serving paths leaves as a 500 with a JSON body.
#[derive(Debug)]
struct ApiError {
    message: String,
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        if matches!(err, PipelineError::NotFound(_)) {
            tracing::warn!(kind = err.kind(), error = %err, "request failed");
        } else {
            tracing::error!(kind = err.kind(), error = %err, "request failed");
            sentry_anyhow::capture_anyhow(&anyhow::Error::new(err));
        }
        Self { message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "message": self.message,
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let message = rejection.body_text();
        tracing::warn!(error = %message, "rejected query string");
        Self { message }
    }
}

fn not_configured(what: &str) -> ApiError {
    ApiError {
        message: format!("{what} is not configured"),
    }
}

async fn read_snapshot(state: &AppState, result_set: ResultSet) -> Result<Json<Success<Value>>, ApiError> {
    let Some(reader) = &state.snapshots else {
        return Err(not_configured("snapshot storage"));
    };
    let data = reader.read(result_set).await?;
    Ok(Json(Success::new(data)))
}

async fn get_pipeline_by_region(
    State(state): State<AppState>,
) -> Result<Json<Success<Value>>, ApiError> {
    read_snapshot(&state, ResultSet::ByRegion).await
}

async fn get_pipeline_by_product(
    State(state): State<AppState>,
) -> Result<Json<Success<Value>>, ApiError> {
    read_snapshot(&state, ResultSet::ByProduct).await
}

#[derive(Debug, Deserialize)]
struct LastMonthParams {
    product: Option<String>,
}

async fn get_last_month_sales(
    State(state): State<AppState>,
    params: Result<Query<LastMonthParams>, QueryRejection>,
) -> Result<Json<Success<Vec<Map<String, Value>>>>, ApiError> {
    let Query(params) = params?;
    let Some(source) = &state.source else {
        return Err(not_configured("sales warehouse"));
    };

    let filter = ProductFilter::from_param(params.product.as_deref());
    let out = adhoc::last_month_sales(source.as_ref(), filter, today_utc()).await?;

    Ok(Json(Success {
        status: "success",
        filter: Some(out.filter.label().to_string()),
        data: out.rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use revops_core::blob::{BlobStore, MemoryBlobStore};
    use revops_core::domain::sales::FactRecord;
    use revops_core::source::{MemorySalesSource, SourceQuery, SourceRows};
    use revops_core::PipelineResult;
    use rust_decimal::Decimal;
    use serde_json::json;
    use tower::ServiceExt;

    const BUCKET: &str = "b";

    fn recent_fact(product: &str, region: &str, amount: i64, status: &str) -> FactRecord {
        FactRecord {
            product: product.to_string(),
            region: region.to_string(),
            amount: Decimal::from(amount),
            status: status.to_string(),
            sale_date: Some(today_utc()),
        }
    }

    fn state_with(store: Arc<MemoryBlobStore>, source: Arc<dyn SalesSource>) -> AppState {
        AppState {
            snapshots: Some(SnapshotReader::new(store, BUCKET)),
            source: Some(source),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    struct DownSource;

    #[async_trait::async_trait]
    impl SalesSource for DownSource {
        fn source_name(&self) -> &'static str {
            "down"
        }

        async fn query(&self, _query: &SourceQuery) -> PipelineResult<SourceRows> {
            Err(PipelineError::SourceUnavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn serves_published_snapshot_verbatim() {
        let store = Arc::new(MemoryBlobStore::new());
        let payload = json!([{"region": "EU", "total_amount": 200.0}]);
        store
            .put(
                BUCKET,
                "pipeline/by-region/data.json",
                serde_json::to_vec(&payload).unwrap(),
                "application/json",
            )
            .await
            .unwrap();

        let app = router(state_with(store, Arc::new(MemorySalesSource::default())));
        let (status, body) = get_json(app, "/pipeline/by-region").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success", "data": payload}));
    }

    #[tokio::test]
    async fn missing_snapshot_is_500_with_error_body() {
        let store = Arc::new(MemoryBlobStore::new());
        let app = router(state_with(store, Arc::new(MemorySalesSource::default())));
        let (status, body) = get_json(app, "/pipeline/by-product").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("snapshot not found"));
    }

    #[tokio::test]
    async fn last_month_defaults_to_all_products() {
        let source = MemorySalesSource::new(vec![
            recent_fact("Widget", "US", 100, "Closed"),
            recent_fact("Gadget", "US", 40, "Open"),
        ]);
        let app = router(state_with(Arc::new(MemoryBlobStore::new()), Arc::new(source)));
        let (status, body) = get_json(app, "/sales/last-month").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["filter"], "All");
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn last_month_filters_on_exact_product() {
        let source = MemorySalesSource::new(vec![
            recent_fact("Widget", "US", 100, "Closed"),
            recent_fact("widget", "US", 40, "Open"),
        ]);
        let app = router(state_with(Arc::new(MemoryBlobStore::new()), Arc::new(source)));
        let (status, body) = get_json(app, "/sales/last-month?product=Widget").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"], "Widget");
        assert_eq!(
            body["data"],
            json!([{"product": "Widget", "region": "US", "total_amount": 100.0, "deal_count": 1, "closed_amount": 100.0}])
        );
    }

    #[tokio::test]
    async fn source_failure_is_500_with_error_body() {
        let app = router(state_with(Arc::new(MemoryBlobStore::new()), Arc::new(DownSource)));
        let (status, body) = get_json(app, "/sales/last-month?product=All").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn malformed_query_string_is_500_with_error_body() {
        let app = router(state_with(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemorySalesSource::default()),
        ));
        let (status, body) = get_json(app, "/sales/last-month?product=A&product=B").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("duplicate field"));
    }

    #[tokio::test]
    async fn unconfigured_storage_is_500() {
        let app = router(AppState {
            snapshots: None,
            source: None,
        });
        let (status, body) = get_json(app, "/pipeline/by-region").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "snapshot storage is not configured");
    }
}
