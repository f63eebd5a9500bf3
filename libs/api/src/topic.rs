use std::future::Future;
use std::pin::Pin;

use crate::{BrokerError, InboundRecord};

// ════════════════════════════════════════════════════════════════
//  Broker seam traits
// ════════════════════════════════════════════════════════════════

/// Поток записей одного partition'а для одной consumer group.
///
/// Реализуется broker client'ом. API crate определяет только трейт,
/// без зависимости от tokio.
pub trait PartitionStream: Send {
    /// Topic, к которому относится поток.
    fn topic(&self) -> &str;

    /// Номер partition'а.
    fn partition(&self) -> i32;

    /// Получить следующую пачку записей в порядке offset'ов.
    ///
    /// Блокирует (async), пока нет хотя бы одной записи.
    /// `None` = partition закрыт, записей больше не будет.
    fn poll(&mut self) -> Pin<Box<dyn Future<Output = Option<Vec<InboundRecord>>> + Send + '_>>;
}

/// Consumer-сторона брокера: подписка consumer group и коммит offset'ов.
pub trait BrokerConsumer: Send + Sync {
    /// Подписать group на topic. Возвращает по одному потоку на partition;
    /// каждый поток начинается с последнего закоммиченного offset'а group.
    ///
    /// - `max_poll_records`: максимальный размер пачки в `poll()`
    #[allow(clippy::type_complexity)]
    fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        max_poll_records: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Box<dyn PartitionStream>>, BrokerError>> + Send + '_>>;

    /// Отметить запись обработанной для group (коммит `offset + 1`).
    fn commit(
        &self,
        group_id: &str,
        record: &InboundRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// Producer-сторона брокера. Fire-and-forget с точки зрения consumer'а.
pub trait BrokerProducer: Send + Sync {
    fn send(
        &self,
        topic: &str,
        payload: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}
