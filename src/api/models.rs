//! API Request and Response Models

use crate::cache::StateCacheStats;
use crate::common::types::{Amount, BallNumber, GameId, PaletteNumber, UserId};
use crate::games::card_catalog::WinningLine;
use crate::games::rooms::RoomView;
use crate::games::session::{ClaimOutcome, DrawOutcome};
use crate::games::types::{Card, Game, GameStatus, Transaction, WinnerInfo};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_games: usize,
    pub rooms: usize,
    pub users: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub initial_balance: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

/// Body of join and leave requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomActionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub user_id: UserId,
    pub palette_number: PaletteNumber,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub game_id: Option<GameId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub user_id: UserId,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinResponse {
    pub room: RoomView,
    /// Game formed by this join, when it completed the lobby
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameStateResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaveResponse {
    pub room_id: String,
    pub user_id: UserId,
    pub left: bool,
}

/// Game record plus values derived from it
#[derive(Debug, Clone, Serialize)]
pub struct GameStateResponse {
    #[serde(flatten)]
    pub game: Game,
    pub pot: Amount,
    pub remaining_numbers: usize,
}

impl From<Game> for GameStateResponse {
    fn from(game: Game) -> Self {
        Self {
            pot: game.pot(),
            remaining_numbers: game.available_numbers.len(),
            game,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawResponse {
    pub game_id: GameId,
    pub number: BallNumber,
    pub draw_index: usize,
    pub remaining: usize,
}

impl DrawResponse {
    pub fn new(game_id: GameId, outcome: DrawOutcome) -> Self {
        Self {
            game_id,
            number: outcome.number,
            draw_index: outcome.draw_index,
            remaining: outcome.remaining,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResponse {
    pub game_id: GameId,
    pub status: GameStatus,
    pub winner: WinnerInfo,
    pub lines: Vec<WinningLine>,
    pub newly_completed: bool,
}

impl ClaimResponse {
    pub fn new(game_id: GameId, outcome: ClaimOutcome) -> Self {
        Self {
            game_id,
            status: GameStatus::Completed,
            winner: outcome.winner,
            lines: outcome.lines,
            newly_completed: outcome.newly_completed,
        }
    }
}

/// Card with its numbers laid out row by row as well as by column
#[derive(Debug, Clone, Serialize)]
pub struct CardResponse {
    #[serde(flatten)]
    pub card: Card,
    /// Rows top to bottom; the free centre cell is 0
    pub grid: [[BallNumber; 5]; 5],
}

impl From<Card> for CardResponse {
    fn from(card: Card) -> Self {
        let mut grid = [[0; 5]; 5];
        for (row, cells) in grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = card.numbers.cell(row, col);
            }
        }
        Self { card, grid }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveGamesResponse {
    pub games: Vec<GameStateResponse>,
    pub cache: StateCacheStats,
}
