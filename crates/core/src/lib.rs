pub mod adhoc;
pub mod aggregate;
pub mod blob;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod snapshot;
pub mod source;
pub mod time;

pub use error::{PipelineError, PipelineResult};

pub mod config {
    use anyhow::Context;

    const DEFAULT_WAREHOUSE_SCHEMA: &str = "public";
    const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_BLOB_FS_ROOT: &str = "./data";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BlobBackend {
        S3,
        Fs,
    }

    impl std::str::FromStr for BlobBackend {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> anyhow::Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "s3" => Ok(Self::S3),
                "fs" => Ok(Self::Fs),
                other => anyhow::bail!("unknown BLOB_BACKEND {other:?} (expected s3 or fs)"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub warehouse_database_url: Option<String>,
        pub warehouse_schema: String,
        pub warehouse_max_connections: u32,
        pub source_timeout_secs: u64,
        pub output_bucket: Option<String>,
        pub blob_backend: BlobBackend,
        pub blob_fs_root: String,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let blob_backend = match std::env::var("BLOB_BACKEND") {
                Ok(s) if !s.trim().is_empty() => s.parse()?,
                _ => BlobBackend::S3,
            };

            Ok(Self {
                warehouse_database_url: std::env::var("WAREHOUSE_DATABASE_URL").ok(),
                warehouse_schema: std::env::var("WAREHOUSE_SCHEMA")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_WAREHOUSE_SCHEMA.to_string()),
                warehouse_max_connections: std::env::var("WAREHOUSE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse::<u32>().ok())
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
                source_timeout_secs: std::env::var("SOURCE_QUERY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS),
                output_bucket: std::env::var("OUTPUT_BUCKET").ok(),
                blob_backend,
                blob_fs_root: std::env::var("BLOB_FS_ROOT")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BLOB_FS_ROOT.to_string()),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_warehouse_database_url(&self) -> anyhow::Result<&str> {
            self.warehouse_database_url
                .as_deref()
                .context("WAREHOUSE_DATABASE_URL is required")
        }

        pub fn require_output_bucket(&self) -> anyhow::Result<&str> {
            self.output_bucket
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .context("OUTPUT_BUCKET is required")
        }

        pub fn source_timeout(&self) -> std::time::Duration {
            std::time::Duration::from_secs(self.source_timeout_secs.max(1))
        }
    }

}
