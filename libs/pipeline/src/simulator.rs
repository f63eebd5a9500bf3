use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use consumer_api::{Category, Failure};

use crate::context::{ContextKey, TraceContext};

// ═══════════════════════════════════════════════════════════════
//  ProcessingStep - pluggable work step
// ═══════════════════════════════════════════════════════════════

/// Шаг бизнес-обработки, вызываемый pipeline'ом для каждой валидной записи.
///
/// Шаг может дописывать атрибуты в trace context. Ожидание внутри шага
/// обязано уважать `token`: отмена возвращается как `Failure::cancelled`.
pub trait ProcessingStep: Send + Sync {
    fn process<'a>(
        &'a self,
        category: Category,
        payload: &'a str,
        ctx: &'a mut TraceContext,
        token: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), Failure>> + Send + 'a>>;
}

// ═══════════════════════════════════════════════════════════════
//  Delay table
// ═══════════════════════════════════════════════════════════════

/// Диапазон задержки в ms: `[min_ms, max_ms)`, либо фиксированная при равных границах.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    pub const fn between(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn contains(&self, ms: u64) -> bool {
        self.min_ms <= ms && ms <= self.max_ms
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rng.gen_range(self.min_ms..self.max_ms)
        }
    }
}

/// Category → диапазон задержки. Индексируется в порядке `Category::ALL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTable {
    ranges: [DelayRange; 5],
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            ranges: [
                DelayRange::between(100, 300), // JSON
                DelayRange::fixed(50),         // ERROR
                DelayRange::between(50, 150),  // TEST
                DelayRange::between(200, 700), // LARGE
                DelayRange::between(50, 150),  // SIMPLE
            ],
        }
    }
}

impl DelayTable {
    pub fn range(&self, category: Category) -> DelayRange {
        self.ranges[category as usize]
    }

    /// Заменить диапазон одной категории.
    pub fn with_range(mut self, category: Category, range: DelayRange) -> Self {
        self.ranges[category as usize] = range;
        self
    }
}

// ═══════════════════════════════════════════════════════════════
//  ProcessingSimulator
// ═══════════════════════════════════════════════════════════════

/// Имитация работы: блокирует worker на случайную задержку из диапазона категории.
pub struct ProcessingSimulator {
    table: DelayTable,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for ProcessingSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSimulator")
            .field("table", &self.table)
            .finish()
    }
}

impl Default for ProcessingSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingSimulator {
    /// Генератор с seed из энтропии ОС.
    pub fn new() -> Self {
        Self {
            table: DelayTable::default(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Детерминированный генератор.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            table: DelayTable::default(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn with_table(mut self, table: DelayTable) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &DelayTable {
        &self.table
    }

    /// Выбрать задержку для категории, ms.
    pub fn draw(&self, category: Category) -> u64 {
        let range = self.table.range(category);
        let mut rng = match self.rng.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("simulator rng lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        range.draw(&mut *rng)
    }

    /// Выбрать задержку и подождать. Возвращает выбранную задержку, ms:
    /// таймер может проснуться позже, но результат остаётся в диапазоне категории.
    pub async fn simulate(&self, category: Category, token: &CancellationToken) -> Result<u64, Failure> {
        wait(self.draw(category), token).await
    }
}

impl ProcessingStep for ProcessingSimulator {
    fn process<'a>(
        &'a self,
        category: Category,
        _payload: &'a str,
        ctx: &'a mut TraceContext,
        token: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), Failure>> + Send + 'a>> {
        Box::pin(async move {
            let delay = self.draw(category);
            ctx.set(ContextKey::SimulatedDelay, delay);
            wait(delay, token).await.map(|_| ())
        })
    }
}

/// Единственная точка приостановки pipeline'а: sleep с кооперативной отменой.
async fn wait(delay_ms: u64, token: &CancellationToken) -> Result<u64, Failure> {
    let started = Instant::now();
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Failure::cancelled(format!(
            "Processing interrupted after {}ms of {delay_ms}ms",
            started.elapsed().as_millis()
        ))),
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => Ok(delay_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consumer_api::FailureKind;

    #[test]
    fn default_table_matches_categories() {
        let table = DelayTable::default();
        assert_eq!(table.range(Category::Json), DelayRange::between(100, 300));
        assert_eq!(table.range(Category::Error), DelayRange::fixed(50));
        assert_eq!(table.range(Category::Test), DelayRange::between(50, 150));
        assert_eq!(table.range(Category::Large), DelayRange::between(200, 700));
        assert_eq!(table.range(Category::Simple), DelayRange::between(50, 150));
    }

    #[test]
    fn draws_stay_in_range() {
        let sim = ProcessingSimulator::with_seed(7);
        for category in Category::ALL {
            let range = sim.table().range(category);
            for _ in 0..500 {
                let d = sim.draw(category);
                assert!(range.contains(d), "{category}: {d} not in {range:?}");
                assert!(d > 0);
            }
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = ProcessingSimulator::with_seed(42);
        let b = ProcessingSimulator::with_seed(42);
        let xs: Vec<u64> = (0..20).map(|_| a.draw(Category::Large)).collect();
        let ys: Vec<u64> = (0..20).map(|_| b.draw(Category::Large)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn error_delay_is_fixed() {
        let sim = ProcessingSimulator::with_seed(1);
        assert!((0..50).all(|_| sim.draw(Category::Error) == 50));
    }

    #[tokio::test(start_paused = true)]
    async fn simulate_returns_delay_within_bounds() {
        let sim = ProcessingSimulator::with_seed(3);
        let token = CancellationToken::new();
        for category in Category::ALL {
            let elapsed = sim.simulate(category, &token).await.unwrap();
            assert!(sim.table().range(category).contains(elapsed), "{category}: {elapsed}");
        }
    }

    #[tokio::test]
    async fn simulate_in_real_time_stays_within_bounds() {
        let sim = ProcessingSimulator::with_seed(21);
        let token = CancellationToken::new();
        for category in Category::ALL {
            let started = std::time::Instant::now();
            let reported = sim.simulate(category, &token).await.unwrap();
            assert!(sim.table().range(category).contains(reported), "{category}: {reported}");
            assert!(started.elapsed() >= Duration::from_millis(reported));
        }
        for _ in 0..5 {
            assert_eq!(sim.simulate(Category::Error, &token).await.unwrap(), 50);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_delay_is_typed_failure() {
        let sim = ProcessingSimulator::with_seed(3);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = sim.simulate(Category::Large, &token).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn process_records_simulated_delay() {
        let sim = ProcessingSimulator::with_seed(9);
        let token = CancellationToken::new();
        let mut ctx = TraceContext::new();
        ctx.begin(&consumer_api::InboundRecord::new("t", 0, 0, 0, "x"));

        sim.process(Category::Simple, "x", &mut ctx, &token).await.unwrap();
        let delay: u64 = ctx.get(ContextKey::SimulatedDelay).unwrap().parse().unwrap();
        assert!(DelayRange::between(50, 150).contains(delay));
    }

    #[test]
    fn table_override() {
        let table = DelayTable::default().with_range(Category::Json, DelayRange::fixed(1));
        let sim = ProcessingSimulator::with_seed(0).with_table(table);
        assert_eq!(sim.draw(Category::Json), 1);
    }
}
