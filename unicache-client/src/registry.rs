//! Named clients shared across a process.
//!
//! Entries are created on first use. The map lock is held only to find or
//! insert an entry; building the client happens under that entry's own lock,
//! so a slow connection setup for one name never stalls lookups of another.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use unicache_common::{CacheResult, JsonCodec, ValueCodec};

use crate::client::RedisClient;

struct Entry<C: ValueCodec> {
    client: OnceLock<Arc<RedisClient<C>>>,
    init: Mutex<()>,
}

impl<C: ValueCodec> Entry<C> {
    fn new() -> Self {
        Entry {
            client: OnceLock::new(),
            init: Mutex::new(()),
        }
    }
}

/// Map from logical name to a lazily created client.
pub struct ClientRegistry<C: ValueCodec = JsonCodec> {
    entries: RwLock<HashMap<String, Arc<Entry<C>>>>,
}

impl<C: ValueCodec> ClientRegistry<C> {
    pub fn new() -> Self {
        ClientRegistry {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the client registered under `name`, creating it with `create`
    /// if this is the first request. A failed creation drops the entry so a
    /// later call can try again.
    pub fn get_or_create<F>(&self, name: &str, create: F) -> CacheResult<Arc<RedisClient<C>>>
    where
        F: FnOnce() -> CacheResult<RedisClient<C>>,
    {
        loop {
            let entry = self.entry(name);
            if let Some(client) = entry.client.get() {
                return Ok(client.clone());
            }
            let _guard = entry.init.lock();
            if let Some(client) = entry.client.get() {
                return Ok(client.clone());
            }
            // A failed creation may have dropped this entry while we waited.
            if !self.is_current(name, &entry) {
                continue;
            }
            return match create() {
                Ok(client) => {
                    let client = Arc::new(client);
                    Ok(entry.client.get_or_init(|| client).clone())
                }
                Err(err) => {
                    let mut entries = self.entries.write();
                    if entries.get(name).is_some_and(|current| Arc::ptr_eq(current, &entry)) {
                        entries.remove(name);
                    }
                    Err(err)
                }
            };
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<RedisClient<C>>> {
        let entries = self.entries.read();
        entries.get(name)?.client.get().cloned()
    }

    /// Drops the entry and closes its client.
    pub fn remove(&self, name: &str) -> Option<Arc<RedisClient<C>>> {
        let entry = self.entries.write().remove(name)?;
        let client = entry.client.get().cloned()?;
        client.close();
        Some(client)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn is_current(&self, name: &str, entry: &Arc<Entry<C>>) -> bool {
        self.entries
            .read()
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    fn entry(&self, name: &str) -> Arc<Entry<C>> {
        if let Some(entry) = self.entries.read().get(name) {
            return entry.clone();
        }
        self.entries
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Entry::new()))
            .clone()
    }
}

impl<C: ValueCodec> Default for ClientRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry of JSON-codec clients.
pub fn global() -> &'static ClientRegistry<JsonCodec> {
    static GLOBAL: OnceLock<ClientRegistry<JsonCodec>> = OnceLock::new();
    GLOBAL.get_or_init(ClientRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::factory::RedisClientFactory;
    use unicache_common::CacheError;

    fn lazy_client() -> CacheResult<RedisClient<JsonCodec>> {
        RedisClientFactory::from_endpoint("redis://127.0.0.1:1", &ClientConfig::default())
    }

    #[test]
    fn second_lookup_reuses_client() {
        let registry = ClientRegistry::new();
        let first = registry.get_or_create("sessions", lazy_client).unwrap();
        let second = registry
            .get_or_create("sessions", || panic!("must not rebuild"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.names(), vec!["sessions".to_string()]);
    }

    #[test]
    fn failed_creation_can_be_retried() {
        let registry: ClientRegistry = ClientRegistry::new();
        let err = registry
            .get_or_create("cart", || Err(CacheError::illegal_argument("bad endpoint")))
            .err()
            .expect("creation fails");
        assert!(err.is_illegal_argument());
        assert!(registry.get("cart").is_none());
        assert!(registry.names().is_empty());
        assert!(registry.get_or_create("cart", lazy_client).is_ok());
        assert_eq!(registry.names(), vec!["cart".to_string()]);
    }

    #[test]
    fn repeated_failures_do_not_grow_the_map() {
        let registry: ClientRegistry = ClientRegistry::new();
        for attempt in 0..5 {
            let name = format!("broken-{attempt}");
            let result =
                registry.get_or_create(&name, || Err(CacheError::illegal_argument("bad endpoint")));
            assert!(result.is_err());
        }
        assert!(registry.names().is_empty());
    }

    #[test]
    fn remove_forgets_entry() {
        let registry = ClientRegistry::new();
        registry.get_or_create("tmp", lazy_client).unwrap();
        assert!(registry.remove("tmp").is_some());
        assert!(registry.get("tmp").is_none());
    }
}
