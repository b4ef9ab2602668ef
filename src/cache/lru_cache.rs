use dashmap::DashMap;
use std::{hash::Hash, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Entrada de cache con TTL contado desde el último acceso
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    last_accessed: Instant,
    hits: u64,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            last_accessed: Instant::now(),
            hits: 0,
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_accessed) > self.ttl
    }
}

/// Cache concurrente con TTL y tamaño máximo.
///
/// Cuando se llena, expulsa la entrada menos usada (menos hits; a igualdad,
/// la de acceso más antiguo). Es seguro para lecturas/inserciones desde las
/// tareas de varios guilds a la vez.
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: DashMap<K, CacheEntry<V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_ttl(key, value, self.default_ttl)
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        self.cleanup_expired();

        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_least_used();
        }

        let entry = CacheEntry::new(value, ttl);
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entry = self.data.get_mut(key)?;

        if entry.is_expired(now) {
            drop(entry);
            self.data.remove(key);
            return None;
        }

        entry.last_accessed = now;
        entry.hits += 1;
        Some(entry.value.clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    fn evict_least_used(&self) {
        let victim = self
            .data
            .iter()
            .min_by_key(|entry| (entry.value().hits, entry.value().last_accessed))
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.data.remove(&key);
            debug!("Cache lleno, entrada menos usada expulsada");
        }
    }
}
