//! In-memory adapters for every collaborator of the pipeline: a
//! partitioned log with consumer groups, both stores and a dead-letter
//! sink. Used by tests and by local runs without brokers.

mod log;
mod store;

pub use log::{partition_for, MemoryLog, MemoryPublisher, MemorySubscription};
pub use store::{MemoryDeadLetters, MemoryLatestStore, MemoryTimeSeries};
