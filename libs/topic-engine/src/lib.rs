pub mod error;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use consumer_api::{
    BrokerConsumer, BrokerError, BrokerProducer, InboundRecord, PartitionStream, now_ms,
};

pub use error::TopicError;

fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(lock = what, "read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(lock = what, "write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Partition
// ═══════════════════════════════════════════════════════════════

#[derive(Clone)]
struct StoredRecord {
    timestamp: i64,
    payload: Option<String>,
}

/// Append-only лог одного partition'а. Offset записи = её позиция в логе.
struct Partition {
    log: RwLock<Vec<StoredRecord>>,
    /// Notification channel: broadcast unit signal on every append / close.
    notify_tx: broadcast::Sender<()>,
}

impl Partition {
    fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            log: RwLock::new(Vec::new()),
            notify_tx,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topic
// ═══════════════════════════════════════════════════════════════

/// Именованный topic из N partition'ов с независимыми offset'ами.
pub struct Topic {
    name: String,
    partitions: Vec<Partition>,
    next_partition: AtomicUsize,
    closed: AtomicBool,
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

impl Topic {
    /// Topic с `partitions` partition'ами (минимум один).
    pub fn new(name: impl Into<String>, partitions: usize) -> Self {
        Self {
            name: name.into(),
            partitions: (0..partitions.max(1)).map(|_| Partition::new()).collect(),
            next_partition: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn partition(&self, partition: i32) -> Result<&Partition, TopicError> {
        usize::try_from(partition)
            .ok()
            .and_then(|i| self.partitions.get(i))
            .ok_or_else(|| TopicError::NoPartition {
                topic: self.name.clone(),
                partition,
            })
    }

    /// Дописать запись в partition. Возвращает присвоенный offset.
    pub fn append(&self, partition: i32, payload: Option<String>) -> Result<i64, TopicError> {
        if self.is_closed() {
            return Err(TopicError::Closed(self.name.clone()));
        }
        let part = self.partition(partition)?;
        let offset = {
            let mut log = write_lock(&part.log, "partition log");
            log.push(StoredRecord {
                timestamp: now_ms(),
                payload,
            });
            (log.len() - 1) as i64
        };
        // Notify readers (ignore if no receivers).
        let _ = part.notify_tx.send(());
        Ok(offset)
    }

    /// Дописать запись в следующий partition по round-robin.
    pub fn send(&self, payload: Option<String>) -> Result<(i32, i64), TopicError> {
        let idx = self.next_partition.fetch_add(1, Ordering::Relaxed) % self.partitions.len();
        let partition = idx as i32;
        let offset = self.append(partition, payload)?;
        Ok((partition, offset))
    }

    /// Прочитать до `limit` записей partition'а начиная с `from`.
    pub fn read(&self, partition: i32, from: i64, limit: usize) -> Result<Vec<InboundRecord>, TopicError> {
        let part = self.partition(partition)?;
        let log = read_lock(&part.log, "partition log");
        let start = usize::try_from(from).unwrap_or(0).min(log.len());
        let end = start.saturating_add(limit).min(log.len());
        Ok(log[start..end]
            .iter()
            .enumerate()
            .map(|(i, stored)| InboundRecord {
                topic: self.name.clone(),
                partition,
                offset: (start + i) as i64,
                timestamp: stored.timestamp,
                payload: stored.payload.clone(),
            })
            .collect())
    }

    /// Закрыть topic: новые записи не принимаются, readers дочитывают
    /// остаток и получают `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for part in &self.partitions {
            let _ = part.notify_tx.send(());
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  PartitionReader - PartitionStream impl
// ═══════════════════════════════════════════════════════════════

/// Курсор одной consumer group по одному partition'у.
pub struct PartitionReader {
    topic: Arc<Topic>,
    partition: i32,
    offset: i64,
    max_poll_records: usize,
    notify_rx: broadcast::Receiver<()>,
}

impl PartitionReader {
    fn new(topic: Arc<Topic>, partition: i32, offset: i64, max_poll_records: usize) -> Result<Self, TopicError> {
        let notify_rx = topic.partition(partition)?.notify_tx.subscribe();
        Ok(Self {
            topic,
            partition,
            offset,
            max_poll_records: max_poll_records.max(1),
            notify_rx,
        })
    }
}

impl PartitionStream for PartitionReader {
    fn topic(&self) -> &str {
        self.topic.name()
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    fn poll(&mut self) -> Pin<Box<dyn Future<Output = Option<Vec<InboundRecord>>> + Send + '_>> {
        Box::pin(async move {
            loop {
                let batch = match self.topic.read(self.partition, self.offset, self.max_poll_records) {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::error!(topic = %self.topic.name(), partition = self.partition, error = %e, "partition read failed");
                        return None;
                    }
                };
                if let Some(last) = batch.last() {
                    self.offset = last.offset + 1;
                    return Some(batch);
                }
                if self.topic.is_closed() {
                    return None;
                }
                // No data yet - wait for notification (lag just means re-read).
                if let Err(broadcast::error::RecvError::Closed) = self.notify_rx.recv().await {
                    return None;
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

type CommitKey = (String, String, i32);

/// In-memory broker: реестр topic'ов + закоммиченные offset'ы групп.
///
/// Каждая group - один consumer, которому назначаются все partition'ы.
/// Коммит позиционный, как в Kafka: commit(offset) = "всё до offset
/// включительно обработано", следующий subscribe продолжает с offset + 1.
#[derive(Default)]
pub struct MemoryBroker {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    committed: RwLock<HashMap<CommitKey, i64>>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topics", &self.topic_names())
            .finish()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создать topic (или вернуть существующий).
    pub fn create_topic(&self, name: &str, partitions: usize) -> Arc<Topic> {
        let mut topics = write_lock(&self.topics, "topic registry");
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(topic = %name, partitions = partitions.max(1), "created topic");
                Arc::new(Topic::new(name, partitions))
            })
            .clone()
    }

    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        read_lock(&self.topics, "topic registry").get(name).cloned()
    }

    pub fn topic_names(&self) -> Vec<String> {
        read_lock(&self.topics, "topic registry").keys().cloned().collect()
    }

    fn require(&self, name: &str) -> Result<Arc<Topic>, TopicError> {
        self.topic(name).ok_or_else(|| TopicError::NotFound(name.to_string()))
    }

    /// Записать payload в конкретный partition (`None` = tombstone).
    pub fn send_to(&self, topic: &str, partition: i32, payload: Option<String>) -> Result<i64, TopicError> {
        self.require(topic)?.append(partition, payload)
    }

    /// Следующий offset, с которого group продолжит чтение partition'а.
    pub fn committed(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        read_lock(&self.committed, "committed offsets")
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Закрыть все topic'и.
    pub fn close(&self) {
        for topic in read_lock(&self.topics, "topic registry").values() {
            topic.close();
        }
    }

    fn commit_offset(&self, group_id: &str, record: &InboundRecord) -> Result<(), TopicError> {
        self.require(&record.topic)?.partition(record.partition)?;
        let key = (group_id.to_string(), record.topic.clone(), record.partition);
        let mut committed = write_lock(&self.committed, "committed offsets");
        let next = record.offset + 1;
        let entry = committed.entry(key).or_insert(next);
        if *entry < next {
            *entry = next;
        }
        Ok(())
    }
}

impl BrokerConsumer for MemoryBroker {
    fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        max_poll_records: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Box<dyn PartitionStream>>, BrokerError>> + Send + '_>> {
        let topic_name = topic.to_string();
        let group_id = group_id.to_string();
        Box::pin(async move {
            let topic = self.require(&topic_name).map_err(TopicError::into_broker_error)?;
            let mut streams: Vec<Box<dyn PartitionStream>> = Vec::with_capacity(topic.partition_count());
            for partition in 0..topic.partition_count() as i32 {
                let start = self.committed(&group_id, &topic_name, partition).unwrap_or(0);
                let reader = PartitionReader::new(topic.clone(), partition, start, max_poll_records)
                    .map_err(TopicError::into_broker_error)?;
                tracing::debug!(topic = %topic_name, group = %group_id, partition, offset = start, "assigned partition");
                streams.push(Box::new(reader));
            }
            Ok(streams)
        })
    }

    fn commit(
        &self,
        group_id: &str,
        record: &InboundRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let result = self
            .commit_offset(group_id, record)
            .map_err(TopicError::into_broker_error);
        Box::pin(async move { result })
    }
}

impl BrokerProducer for MemoryBroker {
    fn send(
        &self,
        topic: &str,
        payload: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let result = self
            .require(topic)
            .and_then(|t| t.send(Some(payload)))
            .map(|_| ())
            .map_err(TopicError::into_broker_error);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consumer_api::BrokerErrorKind;

    #[test]
    fn offsets_are_monotonic_per_partition() {
        let topic = Topic::new("t", 2);
        assert_eq!(topic.append(0, Some("a".into())).unwrap(), 0);
        assert_eq!(topic.append(0, Some("b".into())).unwrap(), 1);
        assert_eq!(topic.append(1, Some("c".into())).unwrap(), 0);
    }

    #[test]
    fn round_robin_spreads_over_partitions() {
        let topic = Topic::new("t", 3);
        let parts: Vec<i32> = (0..6).map(|i| topic.send(Some(i.to_string())).unwrap().0).collect();
        assert_eq!(parts, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn unknown_partition_is_rejected() {
        let topic = Topic::new("t", 1);
        assert!(matches!(topic.append(5, None), Err(TopicError::NoPartition { .. })));
        assert!(matches!(topic.append(-1, None), Err(TopicError::NoPartition { .. })));
    }

    #[test]
    fn closed_topic_rejects_appends() {
        let topic = Topic::new("t", 1);
        topic.close();
        let err = topic.append(0, Some("x".into())).unwrap_err().into_broker_error();
        assert_eq!(err.kind(), BrokerErrorKind::Closed);
    }

    #[tokio::test]
    async fn poll_returns_batches_in_offset_order() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        for i in 0..5 {
            broker.send_to("t", 0, Some(format!("m{i}"))).unwrap();
        }

        let mut streams = broker.subscribe("t", "g", 3).await.unwrap();
        let stream = &mut streams[0];
        let first = stream.poll().await.unwrap();
        assert_eq!(first.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![0, 1, 2]);
        let second = stream.poll().await.unwrap();
        assert_eq!(second.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(second[1].payload.as_deref(), Some("m4"));
    }

    #[tokio::test]
    async fn poll_wakes_on_append_and_ends_on_close() {
        let broker = Arc::new(MemoryBroker::new());
        broker.create_topic("t", 1);
        let mut streams = broker.subscribe("t", "g", 10).await.unwrap();
        let mut stream = streams.remove(0);

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.send("t", "late".into()).await.unwrap();
            producer.close();
        });

        let batch = stream.poll().await.unwrap();
        assert_eq!(batch[0].payload.as_deref(), Some("late"));
        assert!(stream.poll().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_resumes_from_committed_offset() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        for i in 0..4 {
            broker.send_to("t", 0, Some(i.to_string())).unwrap();
        }

        let mut streams = broker.subscribe("t", "g", 2).await.unwrap();
        let batch = streams[0].poll().await.unwrap();
        broker.commit("g", &batch[1]).await.unwrap();
        assert_eq!(broker.committed("g", "t", 0), Some(2));

        let mut again = broker.subscribe("t", "g", 10).await.unwrap();
        let batch = again[0].poll().await.unwrap();
        assert_eq!(batch.first().map(|r| r.offset), Some(2));

        // Другая group читает с начала.
        let mut other = broker.subscribe("t", "other", 10).await.unwrap();
        assert_eq!(other[0].poll().await.unwrap()[0].offset, 0);
    }

    #[tokio::test]
    async fn commit_never_moves_backwards() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        broker.send_to("t", 0, Some("a".into())).unwrap();
        broker.send_to("t", 0, Some("b".into())).unwrap();
        let records = broker.topic("t").unwrap().read(0, 0, 10).unwrap();

        broker.commit("g", &records[1]).await.unwrap();
        broker.commit("g", &records[0]).await.unwrap();
        assert_eq!(broker.committed("g", "t", 0), Some(2));
    }

    #[tokio::test]
    async fn subscribe_to_missing_topic_fails() {
        let broker = MemoryBroker::new();
        let err = broker.subscribe("nope", "g", 1).await.err().unwrap();
        assert_eq!(err.kind(), BrokerErrorKind::NotFound);
    }

    #[test]
    fn tombstones_keep_null_payload() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        broker.send_to("t", 0, None).unwrap();
        let records = broker.topic("t").unwrap().read(0, 0, 1).unwrap();
        assert!(records[0].payload.is_none());
    }
}
