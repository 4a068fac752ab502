use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::timeout;

const REDIS_TIMEOUT_MILLISECS: u64 = 100;

/// Thin command wrapper so that the registry and the entity directory can
/// be driven by a mock in tests. Only the commands we use are exposed.
#[async_trait]
pub trait Client: Send + Sync {
    async fn zadd(&self, k: String, member: String, score: f64) -> Result<()>;
    async fn zrevrange(&self, k: String, start: isize, stop: isize) -> Result<Vec<String>>;
    async fn expire(&self, k: String, seconds: usize) -> Result<()>;
    async fn sismember(&self, k: String, member: String) -> Result<bool>;
}

pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(addr: String) -> Result<RedisClient> {
        let client = redis::Client::open(addr)?;
        Ok(RedisClient { client })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn zadd(&self, k: String, member: String, score: f64) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let results = conn.zadd::<_, _, _, ()>(k, member, score);
        timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results).await??;
        Ok(())
    }

    async fn zrevrange(&self, k: String, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.client.get_async_connection().await?;
        let results = conn.zrevrange(k, start, stop);
        let fut = timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results).await?;
        Ok(fut?)
    }

    async fn expire(&self, k: String, seconds: usize) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let results = conn.expire::<_, ()>(k, seconds);
        timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results).await??;
        Ok(())
    }

    async fn sismember(&self, k: String, member: String) -> Result<bool> {
        let mut conn = self.client.get_async_connection().await?;
        let results = conn.sismember(k, member);
        let fut = timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results).await?;
        Ok(fut?)
    }
}

#[derive(Clone, Default)]
pub struct MockRedisClient {
    broken: bool,
    zrevrange_ret: HashMap<String, Vec<String>>,
    sismember_ret: HashMap<String, Vec<String>>,
    zadd_calls: Arc<Mutex<Vec<(String, String, f64)>>>,
    expire_calls: Arc<Mutex<Vec<(String, usize)>>>,
}

impl MockRedisClient {
    pub fn new() -> MockRedisClient {
        MockRedisClient::default()
    }

    /// Every command fails, as if the server were unreachable.
    pub fn broken(&mut self) -> Self {
        self.broken = true;
        self.clone()
    }

    pub fn zrevrange_ret(&mut self, key: &str, ret: Vec<String>) -> Self {
        self.zrevrange_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn sismember_ret(&mut self, key: &str, members: Vec<String>) -> Self {
        self.sismember_ret.insert(key.to_owned(), members);
        self.clone()
    }

    pub fn zadd_calls(&self) -> Vec<(String, String, f64)> {
        self.zadd_calls.lock().expect("poisoned").clone()
    }

    pub fn expire_calls(&self) -> Vec<(String, usize)> {
        self.expire_calls.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn zadd(&self, k: String, member: String, score: f64) -> Result<()> {
        if self.broken {
            return Err(anyhow!("connection refused"));
        }
        self.zadd_calls
            .lock()
            .expect("poisoned")
            .push((k, member, score));
        Ok(())
    }

    async fn zrevrange(&self, k: String, _start: isize, _stop: isize) -> Result<Vec<String>> {
        if self.broken {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.zrevrange_ret.get(&k).cloned().unwrap_or_default())
    }

    async fn expire(&self, k: String, seconds: usize) -> Result<()> {
        if self.broken {
            return Err(anyhow!("connection refused"));
        }
        self.expire_calls
            .lock()
            .expect("poisoned")
            .push((k, seconds));
        Ok(())
    }

    async fn sismember(&self, k: String, member: String) -> Result<bool> {
        if self.broken {
            return Err(anyhow!("connection refused"));
        }
        Ok(self
            .sismember_ret
            .get(&k)
            .is_some_and(|members| members.contains(&member)))
    }
}
