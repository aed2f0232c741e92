//! Redis list implementation of [`QueueBackend`].
//!
//! Pushes are `LPUSH` and pops are `BRPOP`, so each list is FIFO. `BRPOP`
//! parks the connection it is sent on, so every queue that is popped gets
//! its own connection; pushes share a [`ConnectionManager`].
//!
//! ```rust,ignore
//! let queue = Arc::new(RedisQueue::connect("redis://127.0.0.1:6379").await?);
//! let dispatcher = Dispatcher::new(queue.clone(), QueueNames::default());
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use geotrack_core::QueueBackend;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub struct RedisQueue {
    client: Client,
    writer: ConnectionManager,
    blocking: Mutex<HashMap<String, MultiplexedConnection>>,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).context("invalid redis url")?;
        let writer = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;

        info!("Connected to Redis");

        Ok(Self {
            client,
            writer,
            blocking: Mutex::new(HashMap::new()),
        })
    }

    /// Number of entries waiting on `queue`.
    pub async fn len(&self, queue: &str) -> Result<usize> {
        let mut conn = self.writer.clone();
        let len: usize = conn.llen(queue).await?;
        Ok(len)
    }

    async fn blocking_connection(&self, queue: &str) -> Result<MultiplexedConnection> {
        let mut connections = self.blocking.lock().await;
        if let Some(conn) = connections.get(queue) {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("failed to open blocking connection for {queue}"))?;
        debug!(queue, "Opened blocking connection");
        connections.insert(queue.to_string(), conn.clone());
        Ok(conn)
    }

    async fn discard_blocking_connection(&self, queue: &str) {
        self.blocking.lock().await.remove(queue);
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.writer.clone();
        conn.lpush::<_, _, ()>(queue, payload)
            .await
            .with_context(|| format!("LPUSH {queue} failed"))?;
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.blocking_connection(queue).await?;

        // BRPOP treats 0 as "block forever".
        let seconds = timeout.as_secs_f64().max(0.01);
        let result: redis::RedisResult<Option<(String, Vec<u8>)>> = conn.brpop(queue, seconds).await;

        match result {
            Ok(popped) => Ok(popped.map(|(_, payload)| payload)),
            Err(e) => {
                warn!(queue, error = %e, "BRPOP failed, dropping connection");
                self.discard_blocking_connection(queue).await;
                Err(e).with_context(|| format!("BRPOP {queue} failed"))
            }
        }
    }
}
