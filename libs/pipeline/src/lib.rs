pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod simulator;
mod consumer;
mod worker;

pub use classifier::classify;
pub use consumer::{ConsumerPipeline, Handled, Stage, validate};
pub use context::{ContextKey, MessageId, TraceContext};
pub use error::PipelineError;
pub use retry::RetryPolicy;
pub use simulator::{DelayRange, DelayTable, ProcessingSimulator, ProcessingStep};
pub use worker::{WorkerReport, spawn_consumer, spawn_partition_worker};

/// Target событий брокерного транспорта: получение, коммит, жизнь worker'ов.
pub const TRANSPORT_TARGET: &str = "kafka_consumer";
/// Target бизнес-событий обработки: validation, тип, успех, ошибка.
pub const PROCESSING_TARGET: &str = "message_processing";
