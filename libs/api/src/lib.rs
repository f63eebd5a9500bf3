mod error;
mod topic;
mod types;
mod util;

pub use error::{BrokerError, BrokerErrorKind, Failure, FailureKind};
pub use topic::{BrokerConsumer, BrokerProducer, PartitionStream};
pub use types::{AckDecision, Category, InboundRecord, ProcessingOutcome};
pub use util::{now_ms, truncate_payload};
