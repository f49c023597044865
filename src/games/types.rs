use crate::common::types::{Amount, BallNumber, GameId, PaletteNumber, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Lifecycle of a game. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Waiting,
    Ongoing,
    Completed,
}

impl GameStatus {
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Waiting, GameStatus::Ongoing)
                | (GameStatus::Waiting, GameStatus::Completed)
                | (GameStatus::Ongoing, GameStatus::Completed)
        )
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Waiting => write!(f, "WAITING"),
            GameStatus::Ongoing => write!(f, "ONGOING"),
            GameStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Why a completed game ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    Won,
    PoolExhausted,
    Cancelled,
}

/// A stake tier with its waiting lobby
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub stake_amount: Amount,
    pub max_players: usize,
    pub current_player_ids: Vec<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.current_player_ids.len() >= self.max_players
    }

    pub fn has_player(&self, user_id: UserId) -> bool {
        self.current_player_ids.contains(&user_id)
    }

    pub fn occupancy(&self) -> usize {
        self.current_player_ids.len()
    }
}

/// A user's participation in one game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub user_id: UserId,
    pub card_palette_numbers: Vec<PaletteNumber>,
}

impl Player {
    pub fn holds(&self, palette: PaletteNumber) -> bool {
        self.card_palette_numbers.contains(&palette)
    }
}

/// Payout record, set once per game after a verified claim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinnerInfo {
    pub user_id: UserId,
    pub card_palette_number: PaletteNumber,
    pub verified_at: Timestamp,
    pub payout: Amount,
}

/// One played-out session of a room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub room_id: RoomId,
    pub stake_amount: Amount,
    pub pool_size: BallNumber,
    pub available_numbers: Vec<BallNumber>,
    /// Append-only, in draw order.
    pub drawn_numbers: Vec<BallNumber>,
    pub status: GameStatus,
    #[serde(default)]
    pub outcome: Option<GameOutcome>,
    pub players: Vec<Player>,
    #[serde(default)]
    pub winner: Option<WinnerInfo>,
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    /// Set once the ledger effects of a completed game have been applied.
    #[serde(default)]
    pub settled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Game {
    pub fn has_player(&self, user_id: UserId) -> bool {
        self.players.iter().any(|p| p.user_id == user_id)
    }

    pub fn player(&self, user_id: UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn player_ids(&self) -> Vec<UserId> {
        self.players.iter().map(|p| p.user_id).collect()
    }

    /// Stake pool paid to the winner. Room creation bounds the stake so a
    /// full room cannot overflow; saturates otherwise.
    pub fn pot(&self) -> Amount {
        self.stake_amount.saturating_mul(self.players.len() as Amount)
    }

    pub fn is_completed(&self) -> bool {
        self.status == GameStatus::Completed
    }

    /// Check the structural invariants of a game record.
    ///
    /// Drawn and available numbers partition `1..=pool_size`, players and
    /// palettes are unique, and status agrees with outcome and winner.
    pub fn verify_integrity(&self) -> Result<(), String> {
        let pool = self.pool_size as usize;
        let mut seen = vec![false; pool + 1];
        for &n in self.drawn_numbers.iter().chain(self.available_numbers.iter()) {
            let idx = n as usize;
            if idx == 0 || idx > pool {
                return Err(format!("number {} outside pool 1..={}", n, pool));
            }
            if seen[idx] {
                return Err(format!("number {} appears twice", n));
            }
            seen[idx] = true;
        }
        if self.drawn_numbers.len() + self.available_numbers.len() != pool {
            return Err(format!(
                "{} drawn + {} available does not cover pool of {}",
                self.drawn_numbers.len(),
                self.available_numbers.len(),
                pool
            ));
        }

        let mut users = HashSet::new();
        let mut palettes = HashSet::new();
        for player in &self.players {
            if !users.insert(player.user_id) {
                return Err(format!("user {} listed twice", player.user_id));
            }
            if player.card_palette_numbers.is_empty() {
                return Err(format!("user {} holds no card", player.user_id));
            }
            for palette in &player.card_palette_numbers {
                if !palettes.insert(*palette) {
                    return Err(format!("palette {} assigned twice", palette));
                }
            }
        }

        match self.status {
            GameStatus::Waiting => {
                if !self.drawn_numbers.is_empty() {
                    return Err("waiting game has drawn numbers".to_string());
                }
                if self.outcome.is_some() || self.winner.is_some() {
                    return Err("waiting game already has a result".to_string());
                }
            }
            GameStatus::Ongoing => {
                if self.outcome.is_some() || self.winner.is_some() {
                    return Err("ongoing game already has a result".to_string());
                }
                if self.start_time.is_none() {
                    return Err("ongoing game has no start time".to_string());
                }
            }
            GameStatus::Completed => {
                if self.end_time.is_none() {
                    return Err("completed game has no end time".to_string());
                }
                match (self.outcome, &self.winner) {
                    (Some(GameOutcome::Won), Some(winner)) => {
                        let holds = self
                            .player(winner.user_id)
                            .map(|p| p.holds(winner.card_palette_number))
                            .unwrap_or(false);
                        if !holds {
                            return Err(format!(
                                "winner {} does not hold palette {}",
                                winner.user_id, winner.card_palette_number
                            ));
                        }
                    }
                    (Some(GameOutcome::PoolExhausted), None) | (Some(GameOutcome::Cancelled), None) => {}
                    (outcome, winner) => {
                        return Err(format!(
                            "outcome {:?} disagrees with winner {:?}",
                            outcome,
                            winner.as_ref().map(|w| w.user_id)
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Card numbers by column. The centre cell of `n` holds [`FREE_CELL`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CardNumbers {
    pub b: [BallNumber; 5],
    pub i: [BallNumber; 5],
    pub n: [BallNumber; 5],
    pub g: [BallNumber; 5],
    pub o: [BallNumber; 5],
}

/// Placeholder stored in the free centre cell
pub const FREE_CELL: BallNumber = 0;

impl CardNumbers {
    pub fn from_columns(columns: [[BallNumber; 5]; 5]) -> Self {
        let [b, i, n, g, o] = columns;
        Self { b, i, n, g, o }
    }

    pub fn column(&self, index: usize) -> &[BallNumber; 5] {
        match index {
            0 => &self.b,
            1 => &self.i,
            2 => &self.n,
            3 => &self.g,
            _ => &self.o,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> BallNumber {
        self.column(col)[row]
    }

    pub fn is_free(row: usize, col: usize) -> bool {
        row == 2 && col == 2
    }
}

/// A fixed 5x5 card template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub palette_number: PaletteNumber,
    pub numbers: CardNumbers,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Win,
    Loss,
}

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Deposit,
    Withdrawal,
    StakeCollected,
    StakeRefunded,
    Payout,
}

impl LedgerReason {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            LedgerReason::Deposit | LedgerReason::StakeRefunded => TransactionType::Deposit,
            LedgerReason::Withdrawal => TransactionType::Withdrawal,
            LedgerReason::StakeCollected => TransactionType::Loss,
            LedgerReason::Payout => TransactionType::Win,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Deposit => "deposit",
            LedgerReason::Withdrawal => "withdrawal",
            LedgerReason::StakeCollected => "stake",
            LedgerReason::StakeRefunded => "refund",
            LedgerReason::Payout => "payout",
        }
    }
}

/// Immutable ledger entry. `amount` is signed: credits are positive, debits negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub reason: LedgerReason,
    pub amount: Amount,
    #[serde(default)]
    pub game_id: Option<GameId>,
    pub timestamp: Timestamp,
}

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    pub balance: Amount,
    pub transactions: Vec<Transaction>,
    pub joined_room_ids: Vec<RoomId>,
    pub registration_date: Timestamp,
    pub last_active_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn can_afford(&self, amount: Amount) -> bool {
        self.balance >= amount
    }

    pub fn has_transaction(&self, id: &str) -> bool {
        self.transactions.iter().any(|t| t.id == id)
    }
}
