//! Error types for the bingo engine
//!
//! Every component has its own error enum. They fold into [`BingoError`] and
//! each one reports a stable [`ErrorKind`] that callers (the HTTP layer in
//! particular) can map without matching on individual variants.

use crate::common::types::{Amount, GameId, PaletteNumber, RoomId, UserId};
use crate::games::types::GameStatus;
use serde::Serialize;

/// Stable classification of failures, independent of the component that raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    ResourceExhausted,
    PreconditionFailed,
    InsufficientFunds,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Root error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum BingoError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Card catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Game session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl BingoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BingoError::Configuration(_) => ErrorKind::Internal,
            BingoError::Catalog(e) => e.kind(),
            BingoError::Room(e) => e.kind(),
            BingoError::Ledger(e) => e.kind(),
            BingoError::Session(e) => e.kind(),
            BingoError::Storage(_) => ErrorKind::Internal,
            BingoError::Metrics(_) => ErrorKind::Internal,
        }
    }
}

/// Configuration and validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Missing required field: {0}")]
    MissingRequired(String),
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Palette {palette} is outside the catalog range 1..={max}")]
    InvalidPalette { palette: PaletteNumber, max: PaletteNumber },
    #[error("Requested {requested} cards but only {available} distinct palettes are available")]
    CatalogExhausted { requested: usize, available: usize },
    #[error("Card {palette} is malformed: {reason}")]
    MalformedCard { palette: PaletteNumber, reason: String },
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::InvalidPalette { .. } => ErrorKind::Validation,
            CatalogError::CatalogExhausted { .. } => ErrorKind::ResourceExhausted,
            CatalogError::MalformedCard { .. } => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room {0} not found")]
    RoomNotFound(RoomId),
    #[error("Room {0} already exists")]
    RoomExists(RoomId),
    #[error("Room {room_id} is full ({max_players} players)")]
    RoomFull { room_id: RoomId, max_players: usize },
    #[error("User {user_id} already joined room {room_id}")]
    AlreadyJoined { room_id: RoomId, user_id: UserId },
    #[error("Room {0} is forming a game, try again shortly")]
    FormationInProgress(RoomId),
    #[error("Room {room_id} already runs game {game_id}")]
    GameInProgress { room_id: RoomId, game_id: GameId },
    #[error("Room {room_id} has {waiting} waiting players, {required} required")]
    NotEnoughPlayers {
        room_id: RoomId,
        waiting: usize,
        required: usize,
    },
    #[error("Invalid room definition: {0}")]
    InvalidRoom(String),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::RoomNotFound(_) => ErrorKind::NotFound,
            RoomError::RoomExists(_) => ErrorKind::Conflict,
            RoomError::RoomFull { .. } => ErrorKind::ResourceExhausted,
            RoomError::AlreadyJoined { .. } => ErrorKind::Conflict,
            RoomError::FormationInProgress(_) => ErrorKind::ResourceExhausted,
            RoomError::GameInProgress { .. } => ErrorKind::Conflict,
            RoomError::NotEnoughPlayers { .. } => ErrorKind::PreconditionFailed,
            RoomError::InvalidRoom(_) => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("User {0} not found")]
    UserNotFound(UserId),
    #[error("User {0} already registered")]
    UserExists(UserId),
    #[error("User {user_id} has balance {balance}, needs {required}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Amount,
        required: Amount,
    },
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Amount),
    #[error("Applying {amount} to balance {balance} of user {user_id} overflows")]
    AmountOverflow {
        user_id: UserId,
        balance: Amount,
        amount: Amount,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::UserNotFound(_) => ErrorKind::NotFound,
            LedgerError::UserExists(_) => ErrorKind::Conflict,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidAmount(_) | LedgerError::AmountOverflow { .. } => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Game {0} not found")]
    GameNotFound(GameId),
    #[error("Game {game_id} is {status:?}, not ongoing")]
    GameNotOngoing { game_id: GameId, status: GameStatus },
    #[error("Game {game_id} no longer accepts players ({status:?})")]
    GameNotJoinable { game_id: GameId, status: GameStatus },
    #[error("User {user_id} does not hold palette {palette} in game {game_id}")]
    PlayerNotFoundInGame {
        game_id: GameId,
        user_id: UserId,
        palette: PaletteNumber,
    },
    #[error("User {user_id} already plays in game {game_id}")]
    DuplicatePlayer { game_id: GameId, user_id: UserId },
    #[error("Palette {palette} is already assigned in game {game_id}")]
    DuplicatePalette { game_id: GameId, palette: PaletteNumber },
    #[error("Card {palette} of user {user_id} has no complete line in game {game_id}")]
    InvalidBingoClaim {
        game_id: GameId,
        user_id: UserId,
        palette: PaletteNumber,
    },
    #[error("Game {0} already has a winner")]
    GameAlreadyCompleted(GameId),
    #[error("A draw is already being processed for game {0}")]
    DrawInProgress(GameId),
    #[error("Number pool of game {0} is exhausted")]
    NoMoreNumbers(GameId),
    #[error("Game {game_id} needs {required} players, has {actual}")]
    NotEnoughPlayers {
        game_id: GameId,
        actual: usize,
        required: usize,
    },
    #[error("Formation for room {room_id} aborted with {paying} paying players")]
    FormationAborted { room_id: RoomId, paying: usize },
    #[error("Game {game_id} state is corrupt: {reason}")]
    CorruptState { game_id: GameId, reason: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::GameNotFound(_) => ErrorKind::NotFound,
            SessionError::GameNotOngoing { .. } => ErrorKind::PreconditionFailed,
            SessionError::GameNotJoinable { .. } => ErrorKind::PreconditionFailed,
            SessionError::PlayerNotFoundInGame { .. } => ErrorKind::NotFound,
            SessionError::DuplicatePlayer { .. } => ErrorKind::Conflict,
            SessionError::DuplicatePalette { .. } => ErrorKind::Conflict,
            SessionError::InvalidBingoClaim { .. } => ErrorKind::Validation,
            SessionError::GameAlreadyCompleted(_) => ErrorKind::Conflict,
            SessionError::DrawInProgress(_) => ErrorKind::Conflict,
            SessionError::NoMoreNumbers(_) => ErrorKind::ResourceExhausted,
            SessionError::NotEnoughPlayers { .. } => ErrorKind::PreconditionFailed,
            SessionError::FormationAborted { .. } => ErrorKind::PreconditionFailed,
            SessionError::CorruptState { .. } => ErrorKind::Internal,
            SessionError::Catalog(e) => e.kind(),
        }
    }
}

/// Storage system errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<rocksdb::Error> for BingoError {
    fn from(e: rocksdb::Error) -> Self {
        BingoError::Storage(e.into())
    }
}

// Convenience type alias for Results
pub type BingoResult<T> = Result<T, BingoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let error: BingoError = ConfigurationError::ValidationFailed("pool".to_string()).into();
        assert!(error.to_string().contains("Configuration error"));
        assert!(error.to_string().contains("pool"));
    }

    #[test]
    fn test_kinds_follow_component_errors() {
        let full: BingoError = RoomError::RoomFull {
            room_id: "gold".to_string(),
            max_players: 4,
        }
        .into();
        assert_eq!(full.kind(), ErrorKind::ResourceExhausted);

        let broke: BingoError = LedgerError::InsufficientFunds {
            user_id: 7,
            balance: 10,
            required: 100,
        }
        .into();
        assert_eq!(broke.kind(), ErrorKind::InsufficientFunds);

        let late: BingoError = SessionError::GameAlreadyCompleted("g-1".to_string()).into();
        assert_eq!(late.kind(), ErrorKind::Conflict);

        let wrapped: BingoError = SessionError::from(CatalogError::InvalidPalette {
            palette: 500,
            max: 100,
        })
        .into();
        assert_eq!(wrapped.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_source() {
        let error: BingoError = StorageError::ReadFailed("disk".to_string()).into();
        assert!(error.source().is_some());
        assert_eq!(error.kind().code(), "INTERNAL_ERROR");
    }
}
