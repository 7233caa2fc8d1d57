//! Distributed lock over the cache.
//!
//! A lock is one key holding a random token, written only if absent and with
//! a TTL so a crashed holder cannot keep it forever. Release runs a
//! compare-and-delete script on that single key, which keeps it valid on the
//! cluster driver too.

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use unicache_common::{CacheError, CacheResult, ReturnType, Script, ValueCodec};

use crate::client::RedisClient;

/// Prefix of every lock key.
pub const LOCK_KEY_PREFIX: &str = "unicache:lock:";

const DEFAULT_WAIT: Duration = Duration::from_millis(200);
const MAX_BACKOFF_MILLIS: u64 = 100;

const UNLOCK_SOURCE: &str = "if redis.call('get', KEYS[1]) == ARGV[1] then \
                               return redis.call('del', KEYS[1]) \
                             else \
                               return 0 \
                             end";

fn unlock_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(UNLOCK_SOURCE, ReturnType::Boolean))
}

/// Lock named `name`, held for at most `ttl` once acquired.
///
/// Dropping a held lock releases it; release failures are logged.
pub struct RedisLock<'a, C: ValueCodec> {
    client: &'a RedisClient<C>,
    key: String,
    ttl: Duration,
    token: Option<String>,
}

impl<'a, C: ValueCodec> RedisLock<'a, C> {
    pub fn new(client: &'a RedisClient<C>, name: &str, ttl: Duration) -> CacheResult<Self> {
        if ttl.is_zero() {
            return Err(CacheError::illegal_argument("lock ttl must be greater than zero"));
        }
        Ok(RedisLock {
            client,
            key: format!("{LOCK_KEY_PREFIX}{name}"),
            ttl,
            token: None,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether this handle believes it holds the lock. The server may have
    /// expired it since.
    pub fn is_locked(&self) -> bool {
        self.token.is_some()
    }

    /// One acquisition attempt.
    pub fn try_lock(&mut self) -> CacheResult<bool> {
        if self.token.is_some() {
            return Ok(true);
        }
        let token = new_token();
        let acquired = self.client.set_if_absent_ex(&self.key, &token, self.ttl)?;
        if acquired {
            debug!(key = %self.key, "lock acquired");
            self.token = Some(token);
        }
        Ok(acquired)
    }

    /// Retries `try_lock` with a random pause of up to 100ms until `wait`
    /// has elapsed. A zero `wait` means 200ms.
    pub fn lock(&mut self, wait: Duration) -> CacheResult<bool> {
        let wait = if wait.is_zero() { DEFAULT_WAIT } else { wait };
        let started = Instant::now();
        let mut rng = rand::rng();
        loop {
            if self.try_lock()? {
                return Ok(true);
            }
            let elapsed = started.elapsed();
            if elapsed >= wait {
                return Ok(false);
            }
            let pause = Duration::from_millis(rng.random_range(1..=MAX_BACKOFF_MILLIS));
            thread::sleep(pause.min(wait - elapsed));
        }
    }

    /// Releases the lock if this handle still owns it. Returns false when the
    /// key had expired or been taken over by another holder.
    pub fn unlock(&mut self) -> CacheResult<bool> {
        let Some(token) = self.token.take() else {
            return Ok(false);
        };
        let released = self
            .client
            .run_cached_script::<(), _>(unlock_script(), &[self.key.as_str()], &[token])?
            .as_bool()
            .unwrap_or(false);
        debug!(key = %self.key, released, "lock released");
        Ok(released)
    }
}

impl<C: ValueCodec> Drop for RedisLock<'_, C> {
    fn drop(&mut self) {
        if self.token.is_some() {
            if let Err(err) = self.unlock() {
                warn!(key = %self.key, error = %err, "failed to release lock on drop");
            }
        }
    }
}

fn new_token() -> String {
    format!("{:032x}", rand::rng().random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::factory::RedisClientFactory;

    #[test]
    fn zero_ttl_is_rejected() {
        let client =
            RedisClientFactory::from_endpoint("redis://127.0.0.1:1", &ClientConfig::default()).unwrap();
        let err = RedisLock::new(&client, "orders", Duration::ZERO).err().expect("rejected");
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn key_is_prefixed() {
        let client =
            RedisClientFactory::from_endpoint("redis://127.0.0.1:1", &ClientConfig::default()).unwrap();
        let lock = RedisLock::new(&client, "orders", Duration::from_secs(5)).unwrap();
        assert_eq!(lock.key(), "unicache:lock:orders");
        assert!(!lock.is_locked());
    }

    #[test]
    fn tokens_are_distinct() {
        let first = new_token();
        assert_eq!(first.len(), 32);
        assert_ne!(first, new_token());
    }
}
