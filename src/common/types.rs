//! Shared type definitions for the bingo engine
//!
//! Natural keys of the persisted entities and a few helpers around them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Account identifier, issued by the chat platform that onboards the user.
pub type UserId = i64;

pub type RoomId = String;

pub type GameId = String;

/// Catalog key of a card template.
pub type PaletteNumber = u32;

/// Ball number drawn from the pool.
pub type BallNumber = u8;

/// Balance and stake amounts in integer minor units.
pub type Amount = i64;

pub type Timestamp = DateTime<Utc>;

/// Generate a fresh game identifier
pub fn new_game_id() -> GameId {
    Uuid::new_v4().to_string()
}

/// Generate a fresh identifier for a ledger entry that has no natural key
pub fn new_transaction_id() -> String {
    Uuid::new_v4().to_string()
}
