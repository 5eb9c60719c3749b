use thiserror::Error;

/// Failure taxonomy shared by the batch run and the serving paths.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("query rejected by source: {0}")]
    QueryError(String),

    #[error("publish failed: {0}")]
    PublishError(String),

    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error("snapshot read failed: {0}")]
    ReadError(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "source_unavailable",
            PipelineError::QueryError(_) => "query_error",
            PipelineError::PublishError(_) => "publish_error",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::ReadError(_) => "read_error",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => PipelineError::SourceUnavailable(err.to_string()),
            other => PipelineError::QueryError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_map_to_source_unavailable() {
        let err: PipelineError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: PipelineError = sqlx::Error::Io(io).into();
        assert_eq!(err.kind(), "source_unavailable");
    }

    #[test]
    fn rejected_queries_map_to_query_error() {
        let err: PipelineError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, PipelineError::QueryError(_)));
        assert!(err.to_string().starts_with("query rejected by source"));
    }
}
