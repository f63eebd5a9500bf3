use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use consumer_api::{BrokerConsumer, PartitionStream};

use crate::config::ConsumerConfig;
use crate::consumer::{ConsumerPipeline, Handled};
use crate::context::TraceContext;
use crate::{PipelineError, TRANSPORT_TARGET};

/// Счётчики одного partition worker'а за время его жизни.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub partition: i32,
    pub handled: u64,
    pub completed: u64,
    pub failed: u64,
    pub committed: u64,
}

impl WorkerReport {
    fn record(&mut self, handled: &Handled) {
        self.handled += 1;
        if handled.outcome.succeeded {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Consumer - subscribe → one worker per partition
// ═══════════════════════════════════════════════════════════════

/// Подписать consumer group и запустить по worker'у на каждый partition.
///
/// Partition'ы обрабатываются параллельно, записи внутри partition'а -
/// строго последовательно.
pub async fn spawn_consumer(
    config: &ConsumerConfig,
    broker: Arc<dyn BrokerConsumer>,
    pipeline: Arc<ConsumerPipeline>,
    token: CancellationToken,
) -> Result<Vec<JoinHandle<WorkerReport>>, PipelineError> {
    let streams = broker
        .subscribe(&config.topic, &config.group_id, config.max_poll_records)
        .await
        .map_err(|e| PipelineError::Subscription { topic: config.topic.clone(), source: e })?;

    if streams.is_empty() {
        return Err(PipelineError::NoPartitions(config.topic.clone()));
    }

    tracing::info!(
        target: TRANSPORT_TARGET,
        topic = %config.topic,
        group = %config.group_id,
        partitions = streams.len(),
        manual_commit = config.manual_commit,
        "subscribed"
    );

    Ok(streams
        .into_iter()
        .map(|stream| {
            spawn_partition_worker(
                stream,
                broker.clone(),
                pipeline.clone(),
                config.group_id.clone(),
                config.manual_commit,
                token.clone(),
            )
        })
        .collect())
}

// ═══════════════════════════════════════════════════════════════
//  Partition worker - poll → handle → commit
// ═══════════════════════════════════════════════════════════════

/// Запустить worker одного partition'а.
///
/// Worker владеет своим TraceContext'ом и не берёт следующую запись,
/// пока текущая не дошла до терминального состояния. Коммит - не более
/// одного раза на запись и только после её обработки.
pub fn spawn_partition_worker(
    mut stream: Box<dyn PartitionStream>,
    broker: Arc<dyn BrokerConsumer>,
    pipeline: Arc<ConsumerPipeline>,
    group_id: String,
    manual_commit: bool,
    token: CancellationToken,
) -> JoinHandle<WorkerReport> {
    tokio::spawn(async move {
        let topic = stream.topic().to_string();
        let partition = stream.partition();
        let mut report = WorkerReport { partition, ..Default::default() };
        let mut ctx = TraceContext::new();

        tracing::info!(target: TRANSPORT_TARGET, %topic, partition, group = %group_id, "partition worker started");

        'poll: loop {
            let batch = tokio::select! {
                batch = stream.poll() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
                _ = token.cancelled() => break,
            };

            for record in batch {
                if token.is_cancelled() {
                    break 'poll;
                }

                let handled = pipeline.handle(&record, &mut ctx, &token).await;
                report.record(&handled);

                if !manual_commit || !handled.ack.should_commit() {
                    continue;
                }
                match broker.commit(&group_id, &record).await {
                    Ok(()) => {
                        report.committed += 1;
                        tracing::debug!(target: TRANSPORT_TARGET, %topic, partition, offset = record.offset, "offset committed");
                    }
                    Err(e) => {
                        tracing::error!(target: TRANSPORT_TARGET, %topic, partition, offset = record.offset, error = ?e, "commit error");
                    }
                }
            }
        }

        tracing::info!(
            target: TRANSPORT_TARGET,
            %topic,
            partition,
            handled = report.handled,
            failed = report.failed,
            committed = report.committed,
            "partition worker stopped"
        );
        report
    })
}
