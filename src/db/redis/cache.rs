use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::TrackId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Similar-items lookup for one seed track and result size
    SimilarItems { item_id: TrackId, limit: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::SimilarItems { item_id, limit } => {
                write!(f, "similar:{}:{}", item_id, limit)
            }
        }
    }
}

/// Creates a Redis client for caching
///
/// Only validates the URL; connections are opened lazily per operation.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache in front of an upstream lookup
///
/// Reads happen inline under `op_timeout`; a read that does not finish in
/// time counts as a miss. Writes are queued to a background task so a slow
/// Redis never delays a response.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
    op_timeout: Duration,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Signals the writer to stop and waits until queued writes are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Creates a new Cache and spawns its background writer
    ///
    /// `op_timeout` bounds every Redis round trip, connect included.
    pub fn new(redis_client: Client, op_timeout: Duration) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let task = tokio::spawn(async move {
            Self::cache_writer_task(client, op_timeout, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
            op_timeout,
        };

        (cache, CacheWriterHandle { shutdown_tx, task })
    }

    /// Background task draining the write queue
    ///
    /// On shutdown the queue is closed and every message already in it is
    /// written before the task exits.
    async fn cache_writer_task(
        client: Client,
        op_timeout: Duration,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes = 0u64;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg, op_timeout).await {
                        failed_writes += 1;
                        tracing::warn!(error = %e, failed_writes, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg, op_timeout).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!(failed_writes, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(
        client: &Client,
        msg: CacheWriteMessage,
        op_timeout: Duration,
    ) -> AppResult<()> {
        let write = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
            Ok::<(), AppError>(())
        };

        tokio::time::timeout(op_timeout, write).await.map_err(|_| {
            AppError::Internal(format!("Cache write timed out after {:?}", op_timeout))
        })?
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `Ok(None)` on a miss or when Redis does not answer within
    /// `op_timeout`. Connection and decode failures are errors; callers treat
    /// them as a miss.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let read = async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            let cached: Option<String> = conn.get(key.to_string()).await?;
            Ok::<_, AppError>(cached)
        };

        let cached = match tokio::time::timeout(self.op_timeout, read).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(key = %key, timeout = ?self.op_timeout, "Cache read timed out, treating as miss");
                return Ok(None);
            }
        };

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Queues a value for storage without waiting for Redis
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if self.write_tx.send(msg).is_err() {
            tracing::debug!(key = %key, "Cache writer stopped, dropping write");
        }
    }
}

/// Binds a TCP listener that accepts connections and never replies,
/// returning its `redis://` URL
#[cfg(test)]
pub(crate) async fn spawn_silent_redis() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("redis://{}", addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredCandidate;

    #[tokio::test]
    async fn test_get_from_silent_redis_is_a_miss() {
        let client = create_redis_client(&spawn_silent_redis().await).unwrap();
        let (cache, _handle) = Cache::new(client, Duration::from_millis(50));

        let key = CacheKey::SimilarItems {
            item_id: TrackId(3),
            limit: 5,
        };

        let started = std::time::Instant::now();
        let result: AppResult<Option<Vec<ScoredCandidate>>> = cache.get_from_cache(&key).await;

        assert!(matches!(result, Ok(None)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_with_silent_redis_completes() {
        let client = create_redis_client(&spawn_silent_redis().await).unwrap();
        let (cache, handle) = Cache::new(client, Duration::from_millis(50));

        let key = CacheKey::SimilarItems {
            item_id: TrackId(4),
            limit: 5,
        };
        cache.set_in_background(&key, &vec![ScoredCandidate::new(TrackId(8), 0.2)], 60);

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("writer should give up on a silent Redis");
    }

    #[test]
    fn test_cache_key_display_similar_items() {
        let key = CacheKey::SimilarItems {
            item_id: TrackId(53404),
            limit: 10,
        };
        assert_eq!(format!("{}", key), "similar:53404:10");
    }

    #[test]
    fn test_cache_key_distinguishes_limits() {
        let small = CacheKey::SimilarItems {
            item_id: TrackId(1),
            limit: 5,
        };
        let large = CacheKey::SimilarItems {
            item_id: TrackId(1),
            limit: 50,
        };
        assert_ne!(small.to_string(), large.to_string());
    }

    #[tokio::test]
    async fn test_get_from_unreachable_redis_is_an_error() {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client, Duration::from_millis(100));

        let key = CacheKey::SimilarItems {
            item_id: TrackId(1),
            limit: 10,
        };
        let result: AppResult<Option<Vec<ScoredCandidate>>> = cache.get_from_cache(&key).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_with_unreachable_redis_completes() {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, handle) = Cache::new(client, Duration::from_millis(100));

        let key = CacheKey::SimilarItems {
            item_id: TrackId(2),
            limit: 10,
        };
        cache.set_in_background(&key, &vec![ScoredCandidate::new(TrackId(3), 0.5)], 60);

        handle.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_set_in_background_writes_to_cache() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, handle) = Cache::new(client.clone(), Duration::from_millis(500));

        let key = CacheKey::SimilarItems {
            item_id: TrackId(987_654_321),
            limit: 3,
        };
        let value = vec![
            ScoredCandidate::new(TrackId(11), 0.9),
            ScoredCandidate::new(TrackId(12), 0.4),
        ];

        cache.set_in_background(&key, &value, 60);
        handle.shutdown().await;

        let retrieved: Option<Vec<ScoredCandidate>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
