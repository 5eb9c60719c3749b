use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revops_core::snapshot::SnapshotReader;
use revops_core::source::{PgSalesSource, SalesSource};

mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = revops_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let snapshots = match settings.require_output_bucket() {
        Ok(bucket) => {
            let store = revops_core::blob::from_settings(&settings).await?;
            Some(SnapshotReader::new(store, bucket))
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "OUTPUT_BUCKET missing; snapshot routes will fail");
            None
        }
    };

    let warehouse = match PgSalesSource::from_settings(&settings) {
        Ok(source) => Some(source),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "warehouse not configured; ad-hoc queries will fail");
            None
        }
    };

    let state = routes::AppState {
        snapshots,
        source: warehouse
            .clone()
            .map(|s| Arc::new(s) as Arc<dyn SalesSource>),
    };

    let app = routes::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(source) = warehouse {
        source.close().await;
    }
    served?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &revops_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
