//! Per-message trace context.
//!
//! Контекст принадлежит одному worker'у и живёт ровно столько, сколько
//! обрабатывается одна запись. Атрибуты дублируются в поля `tracing::Span`
//! "message", поэтому каждое событие внутри span'а несёт их автоматически.

use std::collections::BTreeMap;

use tracing::Span;
use tracing::field::Empty;
use uuid::Uuid;

use consumer_api::InboundRecord;

/// Фиксированные ключи trace context'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextKey {
    MessageId,
    Topic,
    Partition,
    Offset,
    MessageTimestamp,
    ProcessingStartTime,
    MessageLength,
    ProcessingStep,
    MessageType,
    SimulatedDelay,
    ProcessingTimeMs,
    ErrorMessage,
    ErrorClass,
}

impl ContextKey {
    pub const ALL: [ContextKey; 13] = [
        ContextKey::MessageId,
        ContextKey::Topic,
        ContextKey::Partition,
        ContextKey::Offset,
        ContextKey::MessageTimestamp,
        ContextKey::ProcessingStartTime,
        ContextKey::MessageLength,
        ContextKey::ProcessingStep,
        ContextKey::MessageType,
        ContextKey::SimulatedDelay,
        ContextKey::ProcessingTimeMs,
        ContextKey::ErrorMessage,
        ContextKey::ErrorClass,
    ];

    /// Имя ключа, оно же имя поля span'а.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::MessageId => "messageId",
            ContextKey::Topic => "topic",
            ContextKey::Partition => "partition",
            ContextKey::Offset => "offset",
            ContextKey::MessageTimestamp => "messageTimestamp",
            ContextKey::ProcessingStartTime => "processingStartTime",
            ContextKey::MessageLength => "messageLength",
            ContextKey::ProcessingStep => "processingStep",
            ContextKey::MessageType => "messageType",
            ContextKey::SimulatedDelay => "simulatedDelay",
            ContextKey::ProcessingTimeMs => "processingTimeMs",
            ContextKey::ErrorMessage => "errorMessage",
            ContextKey::ErrorClass => "errorClass",
        }
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Уникальный id обработки одной записи. Никогда не переиспользуется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Worker-local trace context.
///
/// `begin` заполняет фиксированные ключи из записи, `set` перезаписывает
/// ключ активного контекста, `clear` удаляет всё (идемпотентно).
#[derive(Debug)]
pub struct TraceContext {
    message_id: Option<MessageId>,
    fields: BTreeMap<ContextKey, String>,
    span: Span,
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceContext {
    /// Пустой, неактивный контекст.
    pub fn new() -> Self {
        Self {
            message_id: None,
            fields: BTreeMap::new(),
            span: Span::none(),
        }
    }

    /// Начать контекст для записи: новый MessageId + текущее время.
    ///
    /// Состояние предыдущей записи не переносится.
    pub fn begin(&mut self, record: &InboundRecord) -> MessageId {
        let id = MessageId::generate();
        let started = chrono::Local::now()
            .format("%Y-%m-%dT%H:%M:%S%.3f")
            .to_string();
        let length = record.payload_len();

        self.span = tracing::info_span!(
            target: crate::PROCESSING_TARGET,
            "message",
            messageId = %id,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            messageTimestamp = record.timestamp,
            processingStartTime = %started,
            messageLength = length,
            processingStep = Empty,
            messageType = Empty,
            simulatedDelay = Empty,
            processingTimeMs = Empty,
            errorMessage = Empty,
            errorClass = Empty
        );

        let mut fields = BTreeMap::new();
        fields.insert(ContextKey::MessageId, id.to_string());
        fields.insert(ContextKey::Topic, record.topic.clone());
        fields.insert(ContextKey::Partition, record.partition.to_string());
        fields.insert(ContextKey::Offset, record.offset.to_string());
        fields.insert(ContextKey::MessageTimestamp, record.timestamp.to_string());
        fields.insert(ContextKey::ProcessingStartTime, started);
        fields.insert(ContextKey::MessageLength, length.to_string());
        self.fields = fields;
        self.message_id = Some(id);
        id
    }

    /// Перезаписать ключ. Без активного контекста - no-op.
    pub fn set(&mut self, key: ContextKey, value: impl std::fmt::Display) {
        if self.message_id.is_none() {
            tracing::debug!(key = %key, "trace context not active, ignoring set");
            return;
        }
        let value = value.to_string();
        self.span.record(key.as_str(), value.as_str());
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: ContextKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    pub fn is_active(&self) -> bool {
        self.message_id.is_some()
    }

    /// Span, в котором эмитятся события обработки текущей записи.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Копия всех атрибутов (в порядке `ContextKey`).
    pub fn snapshot(&self) -> Vec<(ContextKey, String)> {
        self.fields.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Удалить все ключи. Безопасно вызывать на неактивном контексте.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.message_id = None;
        self.span = Span::none();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64, payload: &str) -> InboundRecord {
        InboundRecord::new("service-messages", 1, offset, 1_700_000_000_000, payload)
    }

    #[test]
    fn begin_populates_fixed_keys() {
        let mut ctx = TraceContext::new();
        let id = ctx.begin(&record(42, "hello"));

        assert!(ctx.is_active());
        assert_eq!(ctx.get(ContextKey::MessageId), Some(id.to_string().as_str()));
        assert_eq!(ctx.get(ContextKey::Topic), Some("service-messages"));
        assert_eq!(ctx.get(ContextKey::Partition), Some("1"));
        assert_eq!(ctx.get(ContextKey::Offset), Some("42"));
        assert_eq!(ctx.get(ContextKey::MessageTimestamp), Some("1700000000000"));
        assert_eq!(ctx.get(ContextKey::MessageLength), Some("5"));
        assert!(ctx.get(ContextKey::ProcessingStartTime).is_some());
        assert!(ctx.get(ContextKey::MessageType).is_none());
    }

    #[test]
    fn set_overwrites_key() {
        let mut ctx = TraceContext::new();
        ctx.begin(&record(0, "x"));
        ctx.set(ContextKey::ProcessingStep, "validation");
        ctx.set(ContextKey::ProcessingStep, "analysis");
        assert_eq!(ctx.get(ContextKey::ProcessingStep), Some("analysis"));
    }

    #[test]
    fn set_without_begin_is_ignored() {
        let mut ctx = TraceContext::new();
        ctx.set(ContextKey::ErrorMessage, "boom");
        assert!(!ctx.is_active());
        assert!(ctx.snapshot().is_empty());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut ctx = TraceContext::new();
        ctx.clear();
        ctx.begin(&record(0, "x"));
        ctx.clear();
        ctx.clear();
        assert!(!ctx.is_active());
        assert!(ctx.snapshot().is_empty());
    }

    #[test]
    fn no_residual_state_between_records() {
        let mut ctx = TraceContext::new();
        let first = ctx.begin(&record(0, "a"));
        ctx.set(ContextKey::MessageType, "ERROR");
        ctx.set(ContextKey::ErrorMessage, "boom");
        ctx.clear();

        let second = ctx.begin(&record(1, "b"));
        assert_ne!(first, second);
        assert!(ctx.get(ContextKey::MessageType).is_none());
        assert!(ctx.get(ContextKey::ErrorMessage).is_none());
        assert_eq!(ctx.get(ContextKey::Offset), Some("1"));
    }

    #[test]
    fn key_names_are_unique() {
        let mut names: Vec<&str> = ContextKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ContextKey::ALL.len());
    }
}
