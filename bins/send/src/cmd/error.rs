#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("{0}")]
    Config(String),

    #[error("connect: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("{}: {}", .0.code(), .0.message())]
    Rpc(#[from] tonic::Status),

    #[error("observability: {0}")]
    Observability(#[from] sentra_observability::ObservabilityError),
}
