//! Bingo game session engine
//!
//! Stake-based multiplayer bingo: a deterministic card catalog, a persisted
//! balance ledger, stake-tier rooms that form games, and a session engine
//! that draws numbers and settles exactly one winning claim per game.

pub mod api;
pub mod cache;
pub mod common;
pub mod config;
pub mod errors;
pub mod events;
pub mod game_store;
pub mod games;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod services;
pub mod storage;

pub use config::BingoConfig;
pub use errors::{BingoError, BingoResult, ErrorKind};
pub use events::{EventBus, GameEvent};
pub use services::{BingoService, JoinOutcome, ServiceBuilder};
