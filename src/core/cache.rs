use anyhow::Result;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::debug;

/// Read-through cache. Values are loaded on first access and kept for the
/// lifetime of the cache; there is no invalidation.
#[derive(Debug)]
pub struct Cache<K, V>
where
    K: Eq + Hash + Debug,
{
    inner: HashMap<K, V>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let value = self.inner.get(key);
        if value.is_some() {
            debug!("Cache HIT for key: {:?}", key);
        } else {
            debug!("Cache MISS for key: {:?}", key);
        }
        value
    }

    /// Returns the cached value for `key`, running `load` only on a miss. A
    /// failed load is not cached.
    pub fn get_or_try_load<F>(&mut self, key: K, load: F) -> Result<&V>
    where
        F: FnOnce(&K) -> Result<V>,
    {
        match self.inner.entry(key) {
            Entry::Occupied(entry) => {
                debug!("Cache HIT for key: {:?}", entry.key());
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                debug!("Cache MISS for key: {:?}", entry.key());
                let value = load(entry.key())?;
                Ok(entry.insert(value))
            }
        }
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
