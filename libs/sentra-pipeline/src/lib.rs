pub mod config;
pub mod error;
pub mod telemetry;
mod consumer;
mod fanout;
mod ingest;
mod signal;
mod worker;

pub use consumer::{ConsumerStats, PartitionConsumer, RecordOutcome};
pub use error::{FanoutError, IngestError, PipelineError};
pub use fanout::FanoutSink;
pub use ingest::{provision, IngestFront, IngestSummary, RejectPolicy};
pub use signal::{cancel_on_signal, shutdown_signal};
pub use telemetry::{w3c_propagator, Telemetry};
pub use worker::{retry, RetryPolicy, Worker, WorkerDeps, WorkerOptions, WorkerReport};
