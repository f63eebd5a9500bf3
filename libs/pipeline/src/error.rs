#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("subscription ({topic}): {source}")]
    Subscription { topic: String, source: consumer_api::BrokerError },

    #[error("topic '{0}' has no partitions assigned")]
    NoPartitions(String),
}
