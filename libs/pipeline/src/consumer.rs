use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use consumer_api::{
    AckDecision, Category, Failure, InboundRecord, ProcessingOutcome, truncate_payload,
};

use crate::classifier::classify;
use crate::context::{ContextKey, MessageId, TraceContext};
use crate::retry::RetryPolicy;
use crate::simulator::{ProcessingSimulator, ProcessingStep};
use crate::{PROCESSING_TARGET, TRANSPORT_TARGET};

/// Лимит payload'а в структурированном логе успеха.
const LOG_PAYLOAD_CHARS: usize = 100;
/// Лимит payload'а в короткой консольной строке.
const CONSOLE_PAYLOAD_CHARS: usize = 50;

// ═══════════════════════════════════════════════════════════════
//  Stage
// ═══════════════════════════════════════════════════════════════

/// Состояние обработки одной записи.
///
/// `Received → Validating → Classifying → Processing → Completed`,
/// из любого нетерминального состояния возможен переход в `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validating,
    Classifying,
    Processing,
    Completed,
    Failed,
}

/// Результат обработки одной записи: outcome + пройденные состояния + решение о коммите.
#[derive(Debug, Clone)]
pub struct Handled {
    pub message_id: MessageId,
    pub outcome: ProcessingOutcome,
    pub stages: Vec<Stage>,
    pub ack: AckDecision,
}

impl Handled {
    pub fn reached(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Терминальное состояние.
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Received)
    }
}

/// Очищает trace context при любом выходе из обработки: return, panic
/// внутри логирования, drop future'а при abort задачи.
struct ClearOnDrop<'a>(&'a mut TraceContext);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

impl Deref for ClearOnDrop<'_> {
    type Target = TraceContext;

    fn deref(&self) -> &TraceContext {
        self.0
    }
}

impl DerefMut for ClearOnDrop<'_> {
    fn deref_mut(&mut self) -> &mut TraceContext {
        self.0
    }
}

/// Validation: payload не null и не пустой после trim.
pub fn validate(payload: Option<&str>) -> Result<&str, Failure> {
    match payload {
        Some(p) if !p.trim().is_empty() => Ok(p),
        _ => Err(Failure::validation("Empty or null message received")),
    }
}

// ═══════════════════════════════════════════════════════════════
//  ConsumerPipeline
// ═══════════════════════════════════════════════════════════════

/// Одна запись на входе → одно AckDecision на выходе.
///
/// Все ошибки перехватываются здесь и превращаются в лог + решение
/// о коммите; наружу (в worker / broker client) ничего не пробрасывается.
pub struct ConsumerPipeline {
    step: Arc<dyn ProcessingStep>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ConsumerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerPipeline")
            .field("retry", &self.retry)
            .finish()
    }
}

impl ConsumerPipeline {
    pub fn new(step: Arc<dyn ProcessingStep>, retry: RetryPolicy) -> Self {
        Self { step, retry }
    }

    /// Pipeline с ProcessingSimulator и retry policy по умолчанию.
    pub fn simulated(seed: Option<u64>) -> Self {
        let simulator = match seed {
            Some(seed) => ProcessingSimulator::with_seed(seed),
            None => ProcessingSimulator::new(),
        };
        Self::new(Arc::new(simulator), RetryPolicy::default())
    }

    /// Обработать запись. `ctx` очищается на выходе при любом исходе.
    pub async fn handle(
        &self,
        record: &InboundRecord,
        ctx: &mut TraceContext,
        token: &CancellationToken,
    ) -> Handled {
        let mut ctx = ClearOnDrop(ctx);
        let message_id = ctx.begin(record);
        let span = ctx.span().clone();
        self.run(record, message_id, &mut ctx, token)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        record: &InboundRecord,
        message_id: MessageId,
        ctx: &mut TraceContext,
        token: &CancellationToken,
    ) -> Handled {
        let started = Instant::now();
        let mut stages = vec![Stage::Received];

        tracing::info!(
            target: TRANSPORT_TARGET,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            message_id = %message_id,
            "received message"
        );

        let result = self.stages(record, message_id, ctx, &mut stages, token).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(category) => {
                stages.push(Stage::Completed);
                self.complete(record, message_id, ctx, duration_ms);
                Handled {
                    message_id,
                    outcome: ProcessingOutcome::completed(category, duration_ms),
                    stages,
                    ack: AckDecision::Commit,
                }
            }
            Err((category, failure)) => {
                stages.push(Stage::Failed);
                let ack = self.fail(message_id, ctx, &failure);
                Handled {
                    message_id,
                    outcome: ProcessingOutcome::failed(category, duration_ms, failure),
                    stages,
                    ack,
                }
            }
        }
    }

    /// Validating → Classifying → Processing. Ошибка несёт категорию,
    /// если запись успела её получить.
    async fn stages(
        &self,
        record: &InboundRecord,
        message_id: MessageId,
        ctx: &mut TraceContext,
        stages: &mut Vec<Stage>,
        token: &CancellationToken,
    ) -> Result<Category, (Option<Category>, Failure)> {
        stages.push(Stage::Validating);
        ctx.set(ContextKey::ProcessingStep, "validation");
        let payload = validate(record.payload.as_deref()).map_err(|f| (None, f))?;
        tracing::debug!(target: PROCESSING_TARGET, message_id = %message_id, "message validation passed");

        stages.push(Stage::Classifying);
        ctx.set(ContextKey::ProcessingStep, "analysis");
        let category = classify(payload);
        ctx.set(ContextKey::MessageType, category);
        tracing::info!(
            target: PROCESSING_TARGET,
            message_type = %category,
            message_id = %message_id,
            "message type determined"
        );

        stages.push(Stage::Processing);
        ctx.set(ContextKey::ProcessingStep, "business_logic");
        self.step
            .process(category, payload, ctx, token)
            .await
            .map_err(|f| (Some(category), f))?;

        ctx.set(ContextKey::ProcessingStep, "completed");
        tracing::debug!(target: PROCESSING_TARGET, message_id = %message_id, "message processing completed");
        Ok(category)
    }

    fn complete(&self, record: &InboundRecord, message_id: MessageId, ctx: &mut TraceContext, duration_ms: u64) {
        ctx.set(ContextKey::ProcessingTimeMs, duration_ms);
        let payload = record.payload.as_deref();

        tracing::info!(
            target: PROCESSING_TARGET,
            message_id = %message_id,
            processing_time_ms = duration_ms,
            content = %truncate_payload(payload, LOG_PAYLOAD_CHARS),
            "message processed successfully"
        );
        tracing::info!(
            "processed message [{message_id}]: {} ({duration_ms}ms)",
            truncate_payload(payload, CONSOLE_PAYLOAD_CHARS)
        );
    }

    /// Залогировать ошибку и решить: non-retryable → коммит (иначе
    /// бесконечная передоставка), retryable → не коммитить.
    fn fail(&self, message_id: MessageId, ctx: &mut TraceContext, failure: &Failure) -> AckDecision {
        ctx.set(ContextKey::ErrorMessage, failure.message());
        ctx.set(ContextKey::ErrorClass, failure.kind().class_name());
        let retryable = self.retry.is_retryable(failure);

        tracing::error!(
            target: PROCESSING_TARGET,
            message_id = %message_id,
            error = ?failure,
            error_class = %failure.kind(),
            retryable,
            "failed to process message"
        );
        tracing::error!("failed to process message [{message_id}]: {failure}");

        if retryable {
            AckDecision::Withhold
        } else {
            AckDecision::Commit
        }
    }
}
