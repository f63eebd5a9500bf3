use serde::Deserialize;

use crate::retry::TRANSIENT_MARKERS;

// ═══════════════════════════════════════════════════════════════
//  Consumer Config
// ═══════════════════════════════════════════════════════════════

/// Подписка consumer group на topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Topic, из которого читаются сообщения.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group id.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Максимальный размер пачки за один poll.
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
    /// Ручной коммит offset'ов по AckDecision. `false` = коммит не делается
    /// (offset'ами управляет брокер).
    #[serde(default = "default_manual_commit")]
    pub manual_commit: bool,
}

fn default_topic() -> String {
    "service-messages".into()
}
fn default_group_id() -> String {
    "service-two-group".into()
}
fn default_max_poll_records() -> usize {
    500
}
fn default_manual_commit() -> bool {
    true
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            group_id: default_group_id(),
            max_poll_records: default_max_poll_records(),
            manual_commit: default_manual_commit(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Simulator Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulatorConfig {
    /// Seed генератора задержек. `None` = seed из энтропии ОС.
    #[serde(default)]
    pub seed: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  Retry Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Подстроки сообщения ошибки, при которых она считается временной.
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
}

fn default_markers() -> Vec<String> {
    TRANSIENT_MARKERS.iter().map(|m| m.to_string()).collect()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
        }
    }
}
