use serde::{Deserialize, Serialize};

use crate::Failure;

// ════════════════════════════════════════════════════════════════
//  InboundRecord
// ════════════════════════════════════════════════════════════════

/// Запись, доставленная брокером из partition'а topic'а.
///
/// Неизменяема после доставки: pipeline читает её, но никогда не мутирует.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    /// Монотонный в пределах partition'а, не глобально уникальный.
    pub offset: i64,
    /// Broker-assigned timestamp, Unix ms.
    pub timestamp: i64,
    /// `None` = tombstone (null payload).
    pub payload: Option<String>,
}

impl InboundRecord {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        timestamp: i64,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            timestamp,
            payload: Some(payload.into()),
        }
    }

    /// Tombstone record без payload.
    pub fn tombstone(topic: impl Into<String>, partition: i32, offset: i64, timestamp: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            timestamp,
            payload: None,
        }
    }

    /// Длина payload в символах (0 для tombstone).
    pub fn payload_len(&self) -> usize {
        self.payload.as_deref().map_or(0, |p| p.chars().count())
    }
}

// ════════════════════════════════════════════════════════════════
//  Category
// ════════════════════════════════════════════════════════════════

/// Тип сообщения, определяемый по содержимому payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Json,
    Error,
    Test,
    Large,
    Simple,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Json,
        Category::Error,
        Category::Test,
        Category::Large,
        Category::Simple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Json => "JSON",
            Category::Error => "ERROR",
            Category::Test => "TEST",
            Category::Large => "LARGE",
            Category::Simple => "SIMPLE",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════
//  ProcessingOutcome / AckDecision
// ════════════════════════════════════════════════════════════════

/// Итог обработки одной записи.
///
/// `category` отсутствует, если запись не дошла до классификации
/// (validation failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub category: Option<Category>,
    pub duration_ms: u64,
    pub succeeded: bool,
    pub failure: Option<Failure>,
}

impl ProcessingOutcome {
    pub fn completed(category: Category, duration_ms: u64) -> Self {
        Self {
            category: Some(category),
            duration_ms,
            succeeded: true,
            failure: None,
        }
    }

    pub fn failed(category: Option<Category>, duration_ms: u64, failure: Failure) -> Self {
        Self {
            category,
            duration_ms,
            succeeded: false,
            failure: Some(failure),
        }
    }
}

/// Решение о коммите offset'а записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Закоммитить offset (успех или non-retryable ошибка).
    Commit,
    /// Не коммитить: ошибка выглядит временной, брокер доставит повторно.
    Withhold,
}

impl AckDecision {
    pub fn should_commit(self) -> bool {
        matches!(self, AckDecision::Commit)
    }
}
