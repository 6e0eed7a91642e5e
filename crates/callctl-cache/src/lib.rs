//! Redis transient state for callctl
//!
//! Answering machine detection runs on a snoop channel that knows nothing
//! about the call it listens to. The options given by the `amd` action are
//! parked here under the snoop channel id until the detection result arrives.
//!
//! ```no_run
//! use callctl_cache::RedisCache;
//! use callctl_core::{models::CallAmd, traits::AmdCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisCache::new("redis://127.0.0.1:6379").await?.with_amd_ttl(3600);
//!
//!     cache.amd_set("snoop-1", &CallAmd::default()).await?;
//!     assert!(cache.amd_get("snoop-1").await?.is_some());
//!     Ok(())
//! }
//! ```

pub mod keys;

use async_trait::async_trait;
use callctl_core::error::AppError;
use callctl_core::models::CallAmd;
use callctl_core::traits::AmdCache;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use tracing::{debug, error, instrument};

/// AMD option store on a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    amd_ttl_secs: u64,
}

impl RedisCache {
    /// Connect to `url`
    ///
    /// # Errors
    ///
    /// `AppError::CacheConnection` when the URL is invalid or the server is unreachable.
    pub async fn new(url: &str) -> Result<Self, AppError> {
        let client = Client::open(url)
            .map_err(|e| AppError::CacheConnection(format!("invalid redis url: {}", e)))?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Could not connect to redis. err: {}", e);
            AppError::CacheConnection(e.to_string())
        })?;

        debug!("Connected to redis.");
        Ok(Self {
            manager,
            amd_ttl_secs: keys::AMD_TTL_SECS,
        })
    }

    /// Override how long detection options are kept
    pub fn with_amd_ttl(mut self, ttl_secs: u64) -> Self {
        self.amd_ttl_secs = ttl_secs;
        self
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(to_app_error)?;
        Ok(())
    }
}

fn to_app_error(err: RedisError) -> AppError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        AppError::CacheConnection(err.to_string())
    } else {
        AppError::Cache(err.to_string())
    }
}

#[async_trait]
impl AmdCache for RedisCache {
    #[instrument(skip(self, amd), fields(call_id = %amd.call_id))]
    async fn amd_set(&self, snoop_id: &str, amd: &CallAmd) -> Result<(), AppError> {
        let raw = serde_json::to_string(amd)?;
        let mut conn = self.manager.clone();

        let _: () = conn
            .set_ex(keys::amd_key(snoop_id), raw, self.amd_ttl_secs)
            .await
            .map_err(to_app_error)?;
        Ok(())
    }

    async fn amd_get(&self, snoop_id: &str) -> Result<Option<CallAmd>, AppError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(keys::amd_key(snoop_id))
            .await
            .map_err(to_app_error)?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => {
                debug!("No detection options for the snoop channel {}.", snoop_id);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn connect() -> RedisCache {
        RedisCache::new("redis://127.0.0.1:6379")
            .await
            .expect("redis must be running")
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_amd_roundtrip() {
        let cache = connect().await;
        let snoop_id = Uuid::new_v4().to_string();

        let amd = CallAmd {
            call_id: Uuid::new_v4(),
            machine_handle: "hangup".to_string(),
            is_async: true,
        };
        cache.amd_set(&snoop_id, &amd).await.unwrap();
        assert_eq!(cache.amd_get(&snoop_id).await.unwrap(), Some(amd));
        assert_eq!(cache.amd_get("no-such-snoop").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_amd_expires() {
        let cache = connect().await.with_amd_ttl(1);
        let snoop_id = Uuid::new_v4().to_string();

        cache.amd_set(&snoop_id, &CallAmd::default()).await.unwrap();
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        assert_eq!(cache.amd_get(&snoop_id).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_ping() {
        assert!(connect().await.ping().await.is_ok());
    }
}
