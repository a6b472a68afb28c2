use sentra_api::FeedError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Feed(#[from] FeedError),

    #[error("{0}")]
    Pipeline(#[from] sentra_pipeline::PipelineError),

    #[error("observability: {0}")]
    Observability(#[from] sentra_observability::ObservabilityError),

    #[error("grpc server: {0}")]
    Transport(#[from] tonic::transport::Error),
}
