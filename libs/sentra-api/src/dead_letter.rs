use std::future::Future;
use std::pin::Pin;

use crate::error::FeedError;
use crate::log::Delivery;

/// Why a record left the pipeline without being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The value could not be decoded as an update.
    Decode,
    /// At least one of the fan-out writes failed.
    Sink,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Decode => "decode",
            DeadLetterReason::Sink => "sink",
        }
    }
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A skipped record, kept with enough context to replay it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub delivery: Delivery,
    pub reason: DeadLetterReason,
    pub error: String,
}

/// Secondary append target for skipped records.
pub trait DeadLetterSink: Send + Sync {
    fn send(&self, letter: DeadLetter) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>>;
}
