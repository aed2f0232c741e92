use anyhow::{anyhow, Context, Result};
use geotrack_core::queues::{
    ALERT_TOPIC, ARCHIVE_QUEUE, DEAD_LETTER_QUEUE, EVENT_LOG_QUEUE, LOCATION_QUEUE,
};
use geotrack_core::QueueNames;
use std::str::FromStr;
use std::time::Duration;

/// Worker configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    /// Alerts are disabled when unset.
    pub nats_url: Option<String>,
    pub nats_connect_timeout: Duration,
    pub alert_topic: String,
    pub alert_stream: String,
    pub queues: QueueNames,
    pub poll_timeout: Duration,
    pub background_concurrency: usize,
    pub shutdown_timeout: Duration,
    pub log_level: String,
    pub log_json: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; real deployments set the variables directly.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow!("DATABASE_URL environment variable is required"))?,
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),
            nats_url: lookup("NATS_URL").filter(|url| !url.is_empty()),
            nats_connect_timeout: Duration::from_secs(parse(&lookup, "NATS_CONNECT_TIMEOUT_SECS", 5)?),
            alert_topic: var("ALERT_TOPIC", ALERT_TOPIC),
            alert_stream: var("ALERT_STREAM", geotrack_nats::DEFAULT_STREAM),
            queues: QueueNames {
                event_log: var("EVENT_LOG_QUEUE", EVENT_LOG_QUEUE),
                location: var("LOCATION_QUEUE", LOCATION_QUEUE),
                dead_letter: var("DEAD_LETTER_QUEUE", DEAD_LETTER_QUEUE),
                archive: var("ARCHIVE_QUEUE", ARCHIVE_QUEUE),
            },
            poll_timeout: Duration::from_secs(parse(&lookup, "QUEUE_POLL_TIMEOUT_SECS", 5)?),
            background_concurrency: parse(&lookup, "BACKGROUND_CONCURRENCY", 64)?,
            shutdown_timeout: Duration::from_secs(parse(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?),
            log_level: var("LOG_LEVEL", "info"),
            log_json: parse(&lookup, "LOG_JSON", false)?,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
