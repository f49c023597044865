//! TTL cache for game and room views.
//!
//! Entries are refreshed on every state transition; the cache is never the
//! only copy of a record, so an eviction or expiry only costs a store read.

use crate::common::types::{GameId, RoomId};
use crate::config::BingoConfig;
use crate::games::rooms::RoomView;
use crate::games::types::Game;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Least recently used first
    access_order: Vec<K>,
}

/// LRU cache whose entries expire `ttl` after insertion
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    capacity: usize,
    ttl: Duration,
    inner: Mutex<CacheInner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                access_order: Vec::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.created_at.elapsed() > self.ttl,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            inner.entries.remove(key);
            inner.access_order.retain(|k| k != key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        inner.access_order.retain(|k| k != key);
        inner.access_order.push(key.clone());
        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        let mut inner = self.lock();
        while inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key) {
            if inner.access_order.is_empty() {
                break;
            }
            let lru = inner.access_order.remove(0);
            inner.entries.remove(&lru);
        }

        inner.access_order.retain(|k| k != &key);
        inner.access_order.push(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        inner.access_order.retain(|k| k != key);
        inner.entries.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.lock();
        let ttl = self.ttl;
        let expired: Vec<K> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
        }
        inner.access_order.retain(|k| !expired.contains(k));
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateCacheStats {
    pub games: CacheStats,
    pub rooms: CacheStats,
}

/// Game views keyed by game id and room views keyed by room id
pub struct StateCache {
    games: TtlCache<GameId, Game>,
    rooms: TtlCache<RoomId, RoomView>,
    cleanup_interval: Duration,
}

impl StateCache {
    pub fn new(capacity: usize, game_ttl: Duration, room_ttl: Duration) -> Self {
        Self {
            games: TtlCache::new(capacity, game_ttl),
            rooms: TtlCache::new(capacity, room_ttl),
            cleanup_interval: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &BingoConfig) -> Self {
        Self {
            cleanup_interval: Duration::from_secs(config.cache.cleanup_interval_secs.max(1)),
            ..Self::new(config.cache.capacity, config.game_cache_ttl(), config.room_cache_ttl())
        }
    }

    pub fn game(&self, game_id: &str) -> Option<Game> {
        self.games.get(&game_id.to_string())
    }

    pub fn put_game(&self, game: &Game) {
        self.games.put(game.id.clone(), game.clone());
    }

    pub fn invalidate_game(&self, game_id: &str) {
        self.games.remove(&game_id.to_string());
    }

    pub fn room(&self, room_id: &str) -> Option<RoomView> {
        self.rooms.get(&room_id.to_string())
    }

    pub fn put_room(&self, view: &RoomView) {
        self.rooms.put(view.room.id.clone(), view.clone());
    }

    pub fn invalidate_room(&self, room_id: &str) {
        self.rooms.remove(&room_id.to_string());
    }

    pub fn cleanup_expired(&self) -> usize {
        self.games.cleanup_expired() + self.rooms.cleanup_expired()
    }

    pub fn stats(&self) -> StateCacheStats {
        StateCacheStats {
            games: self.games.stats(),
            rooms: self.rooms.stats(),
        }
    }

    /// Periodically drop expired entries
    pub fn start_cleanup_task(cache: Arc<StateCache>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cache.cleanup_interval);
            loop {
                interval.tick().await;
                let removed = cache.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Cache cleanup");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_basic_operations() {
        let cache = TtlCache::new(3, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), None);
        assert_eq!(cache.remove(&"b".to_string()), Some(2));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.get(&"a".to_string());
        cache.put("c".to_string(), 3);

        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = TtlCache::new(10, Duration::from_millis(50));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.put(1u32, "x");
        cache.put(1u32, "y");
        cache.put(2u32, "z");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some("y"));
    }
}
