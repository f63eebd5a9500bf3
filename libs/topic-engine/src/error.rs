#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("topic '{0}' not found")]
    NotFound(String),

    #[error("topic '{topic}' has no partition {partition}")]
    NoPartition { topic: String, partition: i32 },

    #[error("topic '{0}' is closed")]
    Closed(String),
}

impl TopicError {
    /// Convert to BrokerError preserving the kind.
    ///
    /// `NotFound`/`NoPartition` → NotFound kind, `Closed` → Closed kind.
    pub fn into_broker_error(self) -> consumer_api::BrokerError {
        match self {
            e @ (TopicError::NotFound(_) | TopicError::NoPartition { .. }) => {
                consumer_api::BrokerError::not_found(e.to_string())
            }
            e @ TopicError::Closed(_) => consumer_api::BrokerError::closed(e.to_string()),
        }
    }
}
