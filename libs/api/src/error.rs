/// Category of a processing failure. Lets the pipeline decide whether
/// the record may be redelivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Empty or null payload - bad input, never retryable.
    Validation,
    /// Raised by the work step - retryable only for known transient messages.
    Processing,
    /// Worker shutdown during the work step - never retryable.
    Cancelled,
}

impl FailureKind {
    /// Имя класса ошибки для `errorClass` в trace context.
    pub fn class_name(&self) -> &'static str {
        match self {
            FailureKind::Validation => "ValidationError",
            FailureKind::Processing => "ProcessingFailure",
            FailureKind::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Failure raised while handling one record.
///
/// Carries a `FailureKind` for categorization and a human-readable message.
/// Never escapes the pipeline: it ends up in a log record and an ack decision.
#[derive(Clone, PartialEq, Eq)]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    /// Validation error - empty or null payload.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, msg)
    }

    /// Failure of the work step.
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::new(FailureKind::Processing, msg)
    }

    /// Work step interrupted by cooperative cancellation.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, msg)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Failure {}

impl From<String> for Failure {
    fn from(s: String) -> Self { Self::processing(s) }
}

impl From<&str> for Failure {
    fn from(s: &str) -> Self { Self::processing(s) }
}

// ════════════════════════════════════════════════════════════════
//  BrokerError
// ════════════════════════════════════════════════════════════════

/// Category of a broker client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// Topic or partition does not exist.
    NotFound,
    /// Broker or subscription already closed.
    Closed,
}

impl std::fmt::Display for BrokerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerErrorKind::NotFound => f.write_str("not_found"),
            BrokerErrorKind::Closed => f.write_str("closed"),
        }
    }
}

/// Unified error type for the broker seam traits.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerError {
    kind: BrokerErrorKind,
    message: String,
}

impl BrokerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { kind: BrokerErrorKind::NotFound, message: msg.into() }
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self { kind: BrokerErrorKind::Closed, message: msg.into() }
    }

    pub fn kind(&self) -> BrokerErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BrokerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_maps_to_class_name() {
        assert_eq!(Failure::validation("x").kind().class_name(), "ValidationError");
        assert_eq!(Failure::processing("x").kind().class_name(), "ProcessingFailure");
        assert_eq!(Failure::cancelled("x").kind().class_name(), "Cancelled");
    }

    #[test]
    fn debug_includes_kind_display_does_not() {
        let f = Failure::processing("connection refused");
        assert_eq!(format!("{f:?}"), "[ProcessingFailure] connection refused");
        assert_eq!(f.to_string(), "connection refused");
    }

    #[test]
    fn string_conversions_default_to_processing() {
        let f: Failure = "boom".into();
        assert_eq!(f.kind(), FailureKind::Processing);
    }
}
