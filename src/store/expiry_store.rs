use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::errors::{ServiceError, ServiceResult};
use super::{expiry_key, OrderExpiryStore};

// ============================================================================
// Expiry Store - order TTL keys in Redis
// ============================================================================
//
// A pending order owns the key `order:<id>` with the validity period as TTL.
// Redis publishes the key name on `__keyevent@<db>__:expired` once it lapses,
// which requires keyspace notifications with the `Ex` flags.
//
// ============================================================================

pub struct RedisOrderExpiryStore {
    client: redis::Client,
    conn: MultiplexedConnection,
    database: i64,
}

impl RedisOrderExpiryStore {
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = connection_url(config)?;
        let client = redis::Client::open(url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        if config.configure_notifications {
            let configured: redis::RedisResult<()> = redis::cmd("CONFIG")
                .arg("SET")
                .arg("notify-keyspace-events")
                .arg("Ex")
                .query_async(&mut conn)
                .await;
            if let Err(e) = configured {
                tracing::warn!(error = %e, "Could not enable keyspace notifications, relying on server config");
            }
        }

        tracing::info!(database = config.database, "✅ Connected to Redis");

        Ok(Self {
            client,
            conn,
            database: config.database,
        })
    }

    fn expired_channel(&self) -> String {
        format!("__keyevent@{}__:expired", self.database)
    }
}

/// Redis URL with the configured password and database applied.
fn connection_url(config: &RedisConfig) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&config.url)?;
    if !config.password.is_empty() {
        url.set_password(Some(&config.password))
            .map_err(|_| anyhow::anyhow!("redis url {} cannot carry a password", config.url))?;
    }
    url.set_path(&format!("/{}", config.database));
    Ok(url)
}

#[async_trait]
impl OrderExpiryStore for RedisOrderExpiryStore {
    async fn register(&self, order_id: Uuid, ttl: Duration) -> ServiceResult<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(expiry_key(order_id), "1", secs).await?;
        tracing::debug!(order_id = %order_id, ttl_secs = secs, "Registered order expiry");
        Ok(())
    }

    async fn remove(&self, order_id: Uuid) -> ServiceResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(expiry_key(order_id)).await?;
        Ok(())
    }

    async fn remaining(&self, order_id: Uuid) -> ServiceResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let millis: i64 = conn.pttl(expiry_key(order_id)).await?;
        Ok(remaining_from_pttl(millis))
    }

    async fn expirations(&self) -> ServiceResult<BoxStream<'static, String>> {
        let channel = self.expired_channel();
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| ServiceError::persistence("open redis pubsub", e))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| ServiceError::persistence("subscribe to expirations", e))?;

        tracing::info!(channel = %channel, "🎯 Subscribed to key expirations");

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| futures_util::future::ready(msg.get_payload::<String>().ok()))
            .boxed();
        Ok(stream)
    }
}

/// PTTL returns -2 for a missing key and -1 for a key without expiry.
fn remaining_from_pttl(millis: i64) -> Option<Duration> {
    match millis {
        -2 => None,
        m if m < 0 => Some(Duration::ZERO),
        m => Some(Duration::from_millis(m as u64)),
    }
}
