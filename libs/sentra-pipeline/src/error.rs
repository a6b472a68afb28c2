use sentra_api::{FeedError, RejectReason};

/// Failure of one ingest call. Any of these aborts the whole call.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("rejected update: {0}")]
    Rejected(RejectReason),

    #[error("publish failed: {0}")]
    Publish(FeedError),

    #[error("update stream failed: {0}")]
    Stream(String),
}

/// Outcome of the two fan-out writes when at least one failed. A write
/// that succeeded leaves its slot empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.describe())]
pub struct FanoutError {
    pub latest: Option<FeedError>,
    pub series: Option<FeedError>,
}

impl FanoutError {
    fn describe(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if let Some(e) = &self.latest {
            parts.push(format!("latest-value write failed: {e}"));
        }
        if let Some(e) = &self.series {
            parts.push(format!("time-series write failed: {e}"));
        }
        parts.join("; ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("startup ({dependency}): {source}")]
    Startup { dependency: &'static str, source: FeedError },

    #[error("topic provisioning: {0}")]
    Provision(FeedError),
}
