use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::{CoreError, CoreResult};

/// Mutual exclusion keyed by string, with a lease so a crashed holder
/// cannot block the key forever.
#[async_trait]
pub trait KeyedLock: Send + Sync {
    /// Returns `false` when another holder owns an unexpired lease on `key`.
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> CoreResult<bool>;

    /// Releases `key` only if it is still held with `token`.
    async fn release(&self, key: &str, token: &str) -> CoreResult<()>;
}

/// A held key. Dropping it without [`Lease::release`] (for example when the
/// owning request future is cancelled) releases it from a spawned task; with
/// no runtime left the TTL is the fallback.
pub struct Lease {
    lock: Arc<dyn KeyedLock>,
    key: String,
    token: String,
    released: bool,
}

impl Lease {
    /// `Ok(None)` when someone else holds `key`.
    pub async fn acquire(
        lock: Arc<dyn KeyedLock>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> CoreResult<Option<Lease>> {
        let key = key.into();
        let token = uuid::Uuid::new_v4().to_string();
        if !lock.try_acquire(&key, &token, ttl).await? {
            return Ok(None);
        }
        Ok(Some(Lease {
            lock,
            key,
            token,
            released: false,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.lock.release(&self.key, &self.token).await {
            tracing::warn!("Failed to release lock {}: {}", self.key, e);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let lock = self.lock.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release(&key, &token).await {
                        tracing::warn!("Failed to release abandoned lock {}: {}", key, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Lock {} dropped outside a runtime; it expires with its lease", key);
            }
        }
    }
}

/// Process-local [`KeyedLock`]
#[derive(Default)]
pub struct InMemoryKeyedLock {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryKeyedLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyedLock for InMemoryKeyedLock {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> CoreResult<bool> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| CoreError::InternalError("lock table poisoned".into()))?;
        let now = Instant::now();

        if let Some((_, expires_at)) = leases.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }

        leases.insert(key.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> CoreResult<()> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| CoreError::InternalError("lock table poisoned".into()))?;
        if leases.get(key).map(|(t, _)| t == token).unwrap_or(false) {
            leases.remove(key);
        }
        Ok(())
    }
}
