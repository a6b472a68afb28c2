//! Shared contracts of the sentra pipeline: the update data model, the
//! trace carrier, and the traits behind which the partitioned log and the
//! two stores live.

pub mod carrier;
pub mod dead_letter;
pub mod error;
pub mod log;
pub mod record;
pub mod store;

pub use carrier::TraceCarrier;
pub use dead_letter::{DeadLetter, DeadLetterReason, DeadLetterSink};
pub use error::{ErrorKind, FeedError};
pub use log::{Delivery, LogAdmin, LogPublisher, LogRecord, LogSubscription, TopicSpec};
pub use record::{now_ms, Admission, IncomingUpdate, RejectReason, UpdateRecord};
pub use store::{HistoryQuery, LatestValueStore, TimeSeriesStore, UpsertMode, UpsertOutcome};
