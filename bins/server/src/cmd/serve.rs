use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use consumer_api::{BrokerConsumer, BrokerProducer};
use pipeline::{ConsumerPipeline, ProcessingSimulator, RetryPolicy, WorkerReport, spawn_consumer};
use topic_engine::MemoryBroker;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("consumer-server starting");

    // --- Load config ---
    let config = match &args.config {
        Some(path) => {
            let config = ServerConfig::load(path)?;
            tracing::info!(config = %path, "loaded config");
            config
        }
        None => {
            tracing::info!("no config given, using defaults");
            ServerConfig::default()
        }
    };

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Broker + topic ---
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic(&config.consumer.topic, config.broker.partitions);
    tracing::info!(
        topic = %config.consumer.topic,
        partitions = config.broker.partitions,
        "created topic"
    );

    // --- Pipeline ---
    let simulator = match config.simulator.seed {
        Some(seed) => ProcessingSimulator::with_seed(seed),
        None => ProcessingSimulator::new(),
    };
    let retry = RetryPolicy::with_markers(config.retry.markers.iter().cloned());
    tracing::info!(markers = ?retry.markers(), seed = ?config.simulator.seed, "pipeline configured");
    let pipeline = Arc::new(ConsumerPipeline::new(Arc::new(simulator), retry));

    // --- Workers ---
    let consumer: Arc<dyn BrokerConsumer> = broker.clone();
    let workers = spawn_consumer(&config.consumer, consumer, pipeline, token.clone()).await?;

    // --- stdin → topic ---
    let producer: Arc<dyn BrokerProducer> = broker.clone();
    let feeder = spawn_line_feeder(
        BufReader::new(std::io::stdin()),
        producer,
        config.consumer.topic.clone(),
        token.clone(),
    );

    tracing::info!("consumer ready, reading messages from stdin");

    // --- Ожидание Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    // Signal all tasks to stop cooperatively
    token.cancel();
    broker.close();

    let reports = drain(workers, Duration::from_millis(config.shutdown_timeout_ms)).await;
    if !feeder.is_finished() {
        feeder.abort();
    }
    let _ = feeder.await;

    for report in &reports {
        tracing::info!(
            partition = report.partition,
            handled = report.handled,
            completed = report.completed,
            failed = report.failed,
            committed = report.committed,
            "worker report"
        );
    }

    tracing::info!("shutdown complete");
    Ok(())
}

const LINE_BUFFER: usize = 256;

/// Каждая строка `reader` → одно сообщение в topic. Пустые строки тоже
/// отправляются: их отбрасывает validation.
///
/// Блокирующий read идёт в отдельном OS-потоке, не в blocking pool
/// runtime'а. Задача слушает только канал и завершается по `token`.
fn spawn_line_feeder<R>(
    reader: R,
    producer: Arc<dyn BrokerProducer>,
    topic: String,
    token: CancellationToken,
) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<std::io::Result<String>>(LINE_BUFFER);
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in reader.lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to start stdin reader");
    }

    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                line = rx.recv() => line,
                _ = token.cancelled() => break,
            };
            match line {
                Some(Ok(line)) => {
                    if let Err(e) = producer.send(&topic, line).await {
                        tracing::error!(%topic, error = ?e, "send error");
                    }
                }
                None => {
                    tracing::info!("stdin closed, waiting for Ctrl+C");
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "stdin read error");
                    break;
                }
            }
        }
    })
}

/// Подождать worker'ов до `timeout`, оставшихся abort'нуть.
async fn drain(workers: Vec<JoinHandle<WorkerReport>>, timeout: Duration) -> Vec<WorkerReport> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut reports = Vec::with_capacity(workers.len());
    for mut handle in workers {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => tracing::error!(error = %e, "worker task failed"),
            Err(_) => {
                tracing::warn!("worker did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
    reports
}
