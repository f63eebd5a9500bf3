use consumer_api::{Failure, FailureKind};

/// Подстроки, по которым ошибка обработки считается временной.
pub const TRANSIENT_MARKERS: [&str; 3] = ["timeout", "connection", "temporary"];

/// Решает, стоит ли оставить запись незакоммиченной для повторной доставки.
///
/// Узкая эвристика: retryable только `ProcessingFailure`, чьё сообщение
/// содержит один из маркеров (case-sensitive). Validation и Cancelled
/// не повторяются никогда, иначе запись будет зациклена.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    markers: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_markers(TRANSIENT_MARKERS)
    }
}

impl RetryPolicy {
    /// Policy с заданным набором маркеров. Пустые маркеры отбрасываются.
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn is_retryable(&self, failure: &Failure) -> bool {
        match failure.kind() {
            FailureKind::Processing => self
                .markers
                .iter()
                .any(|m| failure.message().contains(m.as_str())),
            FailureKind::Validation | FailureKind::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_markers_are_retryable() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&Failure::processing("connection refused")));
        assert!(policy.is_retryable(&Failure::processing("read timeout after 30s")));
        assert!(policy.is_retryable(&Failure::processing("temporary failure in name resolution")));
    }

    #[test]
    fn match_is_case_sensitive() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(&Failure::processing("Connection refused")));
        assert!(!policy.is_retryable(&Failure::processing("TIMEOUT")));
    }

    #[test]
    fn other_messages_are_not_retryable() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(&Failure::processing("null pointer")));
        assert!(!policy.is_retryable(&Failure::processing("")));
    }

    #[test]
    fn validation_and_cancellation_never_retry() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(&Failure::validation("Empty or null message received")));
        assert!(!policy.is_retryable(&Failure::validation("connection")));
        assert!(!policy.is_retryable(&Failure::cancelled("timeout")));
    }

    #[test]
    fn custom_markers_replace_defaults() {
        let policy = RetryPolicy::with_markers(["unavailable", ""]);
        assert_eq!(policy.markers(), ["unavailable".to_string()]);
        assert!(policy.is_retryable(&Failure::processing("broker unavailable")));
        assert!(!policy.is_retryable(&Failure::processing("connection refused")));
    }
}
