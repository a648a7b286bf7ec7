//! Suppresses exact redeliveries of inbound messages.
//!
//! The messaging webhook is at-least-once. Each message id is claimed in Redis
//! with `SET NX EX`; a second claim of the same id loses. Any Redis problem
//! fails open so a message is never dropped because the cache is down.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "cv-review:inbound:";
/// Redeliveries arrive within minutes; a day is comfortably longer.
const CLAIM_TTL_SECS: u64 = 86_400;
/// Upper bound on connecting plus claiming, per message.
const CLAIM_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct DeliveryDeduplicator {
    client: Option<redis::Client>,
    /// One reconnecting connection shared by every request, opened on first use.
    connection: Arc<OnceCell<ConnectionManager>>,
    timeout: Duration,
}

impl DeliveryDeduplicator {
    pub fn new(client: Option<redis::Client>) -> Self {
        Self {
            client,
            connection: Arc::default(),
            timeout: CLAIM_TIMEOUT,
        }
    }

    /// A deduplicator that lets every message through.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// `true` when this is the first time `message_id` has been seen.
    pub async fn first_delivery(&self, message_id: &str) -> bool {
        let (Some(client), false) = (&self.client, message_id.is_empty()) else {
            return true;
        };
        match tokio::time::timeout(self.timeout, self.claim(client, message_id)).await {
            Ok(Ok(first)) => {
                if !first {
                    debug!("Message {message_id} already claimed");
                }
                first
            }
            Ok(Err(e)) => {
                warn!("Redis dedup unavailable ({e}); processing {message_id} anyway");
                true
            }
            Err(_) => {
                warn!(
                    "Redis dedup timed out after {}ms; processing {message_id} anyway",
                    self.timeout.as_millis()
                );
                true
            }
        }
    }

    async fn claim(&self, client: &redis::Client, message_id: &str) -> redis::RedisResult<bool> {
        let mut conn = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(client.clone()))
            .await?
            .clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("{KEY_PREFIX}{message_id}"))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(CLAIM_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_deduplicator_admits_everything() {
        let dedup = DeliveryDeduplicator::disabled();
        assert!(dedup.first_delivery("SM123").await);
        assert!(dedup.first_delivery("SM123").await);
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_open() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let dedup = DeliveryDeduplicator::new(Some(client));
        assert!(dedup.first_delivery("SM456").await);
    }

    #[tokio::test]
    async fn test_silent_redis_fails_open_quickly() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = redis::Client::open(format!("redis://{addr}/")).unwrap();
        let dedup = DeliveryDeduplicator::new(Some(client));

        let started = std::time::Instant::now();
        assert!(dedup.first_delivery("SM789").await);
        assert!(dedup.first_delivery("SM789").await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
