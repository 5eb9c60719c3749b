use clap::{Parser, ValueEnum};
use revops_core::pipeline::AggregationMode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod job;

#[derive(Debug, Parser)]
#[command(name = "revops_worker")]
struct Args {
    /// Aggregate and log the result without writing any snapshot.
    #[arg(long)]
    dry_run: bool,

    /// Where the group-by runs: here, or inside the warehouse.
    #[arg(long, value_enum, default_value_t = Mode::InProcess)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    InProcess,
    Pushdown,
}

impl From<Mode> for AggregationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::InProcess => AggregationMode::InProcess,
            Mode::Pushdown => AggregationMode::Pushdown,
        }
    }
}

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

    let args = Args::parse();

    if let Err(err) = job::run(&settings, args.mode.into(), args.dry_run).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "pipeline job failed");
        return Err(err);
    }

    Ok(())
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
