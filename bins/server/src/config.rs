use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use pipeline::config::{ConsumerConfig, RetryConfig, SimulatorConfig};

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "consumer-server", about = "Consumer сервисных сообщений с трассировкой обработки")]
pub struct Cli {
    /// Формат логов
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить consumer: stdin → topic → partition worker'ы
    Serve(ServeArgs),
    /// Определить тип сообщения и диапазон его задержки
    Classify(ClassifyArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу. Без него используются значения по умолчанию.
    #[arg(long, env = "CONSUMER_CONFIG")]
    pub config: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ClassifyArgs {
    /// Текст сообщения (слова склеиваются через пробел)
    #[arg(required = true)]
    pub payload: Vec<String>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Сколько ждать worker'ов после Ctrl+C перед abort.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            consumer: ConsumerConfig::default(),
            broker: BrokerConfig::default(),
            simulator: SimulatorConfig::default(),
            retry: RetryConfig::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_partitions")]
    pub partitions: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
        }
    }
}

fn default_partitions() -> usize {
    3
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.broker.partitions == 0 {
            return Err("broker.partitions must be > 0".into());
        }
        if config.consumer.max_poll_records == 0 {
            return Err("consumer.max_poll_records must be > 0".into());
        }
        Ok(config)
    }
}
