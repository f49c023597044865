//! Shared traits and interfaces
//!
//! The engine talks to persistence, time and draw pacing only through the
//! traits below, so tests can swap each of them for a deterministic double.

use crate::common::types::Timestamp;
use crate::errors::BingoResult;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Mutex, PoisonError};

/// Document collections kept by the store. Each entity is keyed by its natural id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Rooms,
    Games,
    Users,
}

impl Collection {
    pub fn prefix(&self) -> &'static str {
        match self {
            Collection::Rooms => "room:",
            Collection::Games => "game:",
            Collection::Users => "user:",
        }
    }

    pub fn key(&self, id: &str) -> Vec<u8> {
        format!("{}{}", self.prefix(), id).into_bytes()
    }
}

/// Document-oriented persistent store.
///
/// Writes are single-document; the engine never relies on multi-document
/// transactions.
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: Collection, id: &str) -> BingoResult<Option<Vec<u8>>>;

    fn put(&self, collection: Collection, id: &str, document: &[u8]) -> BingoResult<()>;

    fn delete(&self, collection: Collection, id: &str) -> BingoResult<()>;

    /// All documents of a collection as `(id, document)` pairs, ordered by id.
    fn scan(&self, collection: Collection) -> BingoResult<Vec<(String, Vec<u8>)>>;
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Paces the draw scheduler. `tick` resolves when the next round is due and
/// returns `false` once the ticker is finished.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_collection_keys_are_prefixed() {
        assert_eq!(Collection::Games.key("abc"), b"game:abc".to_vec());
        assert_eq!(Collection::Users.key("42"), b"user:42".to_vec());
        assert_ne!(Collection::Rooms.prefix(), Collection::Games.prefix());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));
    }

    struct CountdownTicker(u32);

    #[async_trait]
    impl Ticker for CountdownTicker {
        async fn tick(&mut self) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    #[tokio::test]
    async fn test_ticker_trait_object() {
        let mut ticker: Box<dyn Ticker> = Box::new(CountdownTicker(2));
        assert!(ticker.tick().await);
        assert!(ticker.tick().await);
        assert!(!ticker.tick().await);
    }
}
