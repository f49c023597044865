//! Game session: the per-game state machine.
//!
//! `WAITING -> ONGOING -> COMPLETED`. All mutations of the game record go
//! through one mutex. Claim validation runs outside it against a snapshot of
//! the drawn numbers and is committed only if the game is still ongoing.

use crate::common::traits::Clock;
use crate::common::types::{Amount, BallNumber, GameId, PaletteNumber, RoomId, UserId};
use crate::config::ExhaustedPoolPolicy;
use crate::errors::SessionError;
use crate::games::card_catalog::{CardCatalog, WinningLine};
use crate::games::types::{Game, GameOutcome, GameStatus, Player, WinnerInfo};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Ledger effect of a completed game, handed out once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Settlement {
    Payout { winner: UserId, amount: Amount },
    Refund { players: Vec<UserId>, stake: Amount },
    Forfeit { pot: Amount },
}

/// What a completed game owes, derived from its record
pub fn settlement_for(game: &Game, policy: ExhaustedPoolPolicy) -> Option<Settlement> {
    if !game.is_completed() {
        return None;
    }
    let refund = || Settlement::Refund {
        players: game.player_ids(),
        stake: game.stake_amount,
    };
    match game.outcome? {
        GameOutcome::Won => game.winner.as_ref().map(|w| Settlement::Payout {
            winner: w.user_id,
            amount: w.payout,
        }),
        GameOutcome::Cancelled => Some(refund()),
        GameOutcome::PoolExhausted => match policy {
            ExhaustedPoolPolicy::Forfeit => Some(Settlement::Forfeit { pot: game.pot() }),
            ExhaustedPoolPolicy::Refund => Some(refund()),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawOutcome {
    pub number: BallNumber,
    /// 1-based position of the number in the draw order
    pub draw_index: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimOutcome {
    pub winner: WinnerInfo,
    pub lines: Vec<WinningLine>,
    /// False when the claim repeats an already recorded win
    pub newly_completed: bool,
}

struct SessionState {
    game: Game,
    rng: StdRng,
    settlement: Option<Settlement>,
}

pub struct GameSession {
    id: GameId,
    room_id: RoomId,
    state: Mutex<SessionState>,
    drawing: AtomicBool,
    clock: Arc<dyn Clock>,
    policy: ExhaustedPoolPolicy,
}

/// Exclusive right to draw. Other draws are rejected while it is held.
pub struct DrawPermit<'a> {
    session: &'a GameSession,
}

impl DrawPermit<'_> {
    pub fn draw(&self) -> Result<DrawOutcome, SessionError> {
        self.session.draw_locked()
    }
}

impl Drop for DrawPermit<'_> {
    fn drop(&mut self) {
        self.session.drawing.store(false, Ordering::Release);
    }
}

impl GameSession {
    /// New game in `WAITING` with the full number pool available
    pub fn new(
        game_id: GameId,
        room_id: RoomId,
        stake_amount: Amount,
        pool_size: BallNumber,
        rng: StdRng,
        clock: Arc<dyn Clock>,
        policy: ExhaustedPoolPolicy,
    ) -> Self {
        let now = clock.now();
        let game = Game {
            id: game_id.clone(),
            room_id: room_id.clone(),
            stake_amount,
            pool_size,
            available_numbers: (1..=pool_size).collect(),
            drawn_numbers: Vec::new(),
            status: GameStatus::Waiting,
            outcome: None,
            players: Vec::new(),
            winner: None,
            start_time: None,
            end_time: None,
            settled: false,
            created_at: now,
            updated_at: now,
        };
        Self::from_parts(game, rng, clock, policy)
    }

    /// Rebuild a session from a persisted record after checking its invariants
    pub fn restore(
        game: Game,
        rng: StdRng,
        clock: Arc<dyn Clock>,
        policy: ExhaustedPoolPolicy,
    ) -> Result<Self, SessionError> {
        game.verify_integrity().map_err(|reason| SessionError::CorruptState {
            game_id: game.id.clone(),
            reason,
        })?;
        Ok(Self::from_parts(game, rng, clock, policy))
    }

    fn from_parts(game: Game, rng: StdRng, clock: Arc<dyn Clock>, policy: ExhaustedPoolPolicy) -> Self {
        Self {
            id: game.id.clone(),
            room_id: game.room_id.clone(),
            state: Mutex::new(SessionState {
                game,
                rng,
                settlement: None,
            }),
            drawing: AtomicBool::new(false),
            clock,
            policy,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Game {
        self.lock().game.clone()
    }

    pub fn status(&self) -> GameStatus {
        self.lock().game.status
    }

    pub fn add_player(&self, user_id: UserId, palettes: Vec<PaletteNumber>) -> Result<(), SessionError> {
        let mut state = self.lock();
        let game = &mut state.game;
        if game.status != GameStatus::Waiting {
            return Err(SessionError::GameNotJoinable {
                game_id: self.id.clone(),
                status: game.status,
            });
        }
        if game.has_player(user_id) {
            return Err(SessionError::DuplicatePlayer {
                game_id: self.id.clone(),
                user_id,
            });
        }
        if let Some(&palette) = palettes
            .iter()
            .find(|p| game.players.iter().any(|player| player.holds(**p)))
        {
            return Err(SessionError::DuplicatePalette {
                game_id: self.id.clone(),
                palette,
            });
        }

        game.players.push(Player {
            user_id,
            card_palette_numbers: palettes,
        });
        game.updated_at = self.clock.now();
        Ok(())
    }

    /// `WAITING -> ONGOING`
    pub fn start(&self, min_players: usize) -> Result<Game, SessionError> {
        let mut state = self.lock();
        let game = &mut state.game;
        if !game.status.can_transition_to(GameStatus::Ongoing) {
            return Err(SessionError::GameNotJoinable {
                game_id: self.id.clone(),
                status: game.status,
            });
        }
        if game.players.len() < min_players {
            return Err(SessionError::NotEnoughPlayers {
                game_id: self.id.clone(),
                actual: game.players.len(),
                required: min_players,
            });
        }

        let now = self.clock.now();
        game.status = GameStatus::Ongoing;
        game.start_time = Some(now);
        game.updated_at = now;
        info!(game_id = %self.id, room_id = %self.room_id, players = game.players.len(), "Game started");
        Ok(game.clone())
    }

    /// Take the draw permit, failing with `DrawInProgress` if another draw
    /// is still being processed.
    pub fn begin_draw(&self) -> Result<DrawPermit<'_>, SessionError> {
        self.drawing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::DrawInProgress(self.id.clone()))?;
        Ok(DrawPermit { session: self })
    }

    pub fn draw_next(&self) -> Result<DrawOutcome, SessionError> {
        self.begin_draw()?.draw()
    }

    fn draw_locked(&self) -> Result<DrawOutcome, SessionError> {
        let mut state = self.lock();
        if state.game.status != GameStatus::Ongoing {
            return Err(SessionError::GameNotOngoing {
                game_id: self.id.clone(),
                status: state.game.status,
            });
        }

        if state.game.available_numbers.is_empty() {
            self.complete(&mut state, GameOutcome::PoolExhausted, None);
            info!(game_id = %self.id, "Number pool exhausted without a winner");
            return Err(SessionError::NoMoreNumbers(self.id.clone()));
        }

        let len = state.game.available_numbers.len();
        let index = state.rng.gen_range(0..len);
        let number = state.game.available_numbers.swap_remove(index);
        state.game.drawn_numbers.push(number);
        state.game.updated_at = self.clock.now();

        let outcome = DrawOutcome {
            number,
            draw_index: state.game.drawn_numbers.len(),
            remaining: state.game.available_numbers.len(),
        };
        debug!(game_id = %self.id, number, draw_index = outcome.draw_index, "Number drawn");
        Ok(outcome)
    }

    /// Verify and commit a win for `palette`.
    ///
    /// Repeating the recorded winning claim returns the same `WinnerInfo`
    /// with `newly_completed == false`.
    pub fn claim_win(
        &self,
        user_id: UserId,
        palette: PaletteNumber,
        catalog: &CardCatalog,
    ) -> Result<ClaimOutcome, SessionError> {
        let drawn = {
            let state = self.lock();
            if let Some(repeat) = resolve_closed_claim(&state.game, user_id, palette)? {
                return Ok(repeat);
            }
            let holds = state
                .game
                .player(user_id)
                .map(|p| p.holds(palette))
                .unwrap_or(false);
            if !holds {
                return Err(SessionError::PlayerNotFoundInGame {
                    game_id: self.id.clone(),
                    user_id,
                    palette,
                });
            }
            state.game.drawn_numbers.clone()
        };

        let card = catalog.generate_card(palette)?;
        let lines = CardCatalog::winning_lines(&card, &drawn);
        if lines.is_empty() {
            return Err(SessionError::InvalidBingoClaim {
                game_id: self.id.clone(),
                user_id,
                palette,
            });
        }

        let mut state = self.lock();
        if let Some(repeat) = resolve_closed_claim(&state.game, user_id, palette)? {
            return Ok(repeat);
        }

        let winner = WinnerInfo {
            user_id,
            card_palette_number: palette,
            verified_at: self.clock.now(),
            payout: state.game.pot(),
        };
        self.complete(&mut state, GameOutcome::Won, Some(winner.clone()));
        info!(
            game_id = %self.id,
            user_id,
            palette,
            payout = winner.payout,
            drawn = drawn.len(),
            "Bingo claim accepted"
        );
        Ok(ClaimOutcome {
            winner,
            lines,
            newly_completed: true,
        })
    }

    /// Force the game to end with every stake refunded
    pub fn cancel(&self) -> Result<Game, SessionError> {
        let mut state = self.lock();
        if !state.game.status.can_transition_to(GameStatus::Completed) {
            return Err(SessionError::GameNotOngoing {
                game_id: self.id.clone(),
                status: state.game.status,
            });
        }
        self.complete(&mut state, GameOutcome::Cancelled, None);
        info!(game_id = %self.id, "Game cancelled");
        Ok(state.game.clone())
    }

    /// The pending settlement, returned at most once
    pub fn take_settlement(&self) -> Option<Settlement> {
        self.lock().settlement.take()
    }

    fn complete(&self, state: &mut SessionState, outcome: GameOutcome, winner: Option<WinnerInfo>) {
        debug_assert!(state.game.status.can_transition_to(GameStatus::Completed));
        let now = self.clock.now();
        let game = &mut state.game;
        game.status = GameStatus::Completed;
        game.outcome = Some(outcome);
        game.winner = winner;
        game.end_time = Some(now);
        game.updated_at = now;
        state.settlement = settlement_for(&state.game, self.policy);
    }
}

/// Claim outcome for a game that is not ongoing, or `Ok(None)` if it is.
///
/// The recorded winner repeating their claim gets the recorded result; any
/// other claim on a won game loses the race. Games that ended without a
/// winner, or have not started, reject claims.
pub fn resolve_closed_claim(
    game: &Game,
    user_id: UserId,
    palette: PaletteNumber,
) -> Result<Option<ClaimOutcome>, SessionError> {
    match (game.status, &game.winner) {
        (GameStatus::Ongoing, _) => Ok(None),
        (GameStatus::Completed, Some(winner)) => {
            if winner.user_id == user_id && winner.card_palette_number == palette {
                Ok(Some(ClaimOutcome {
                    winner: winner.clone(),
                    lines: Vec::new(),
                    newly_completed: false,
                }))
            } else {
                Err(SessionError::GameAlreadyCompleted(game.id.clone()))
            }
        }
        (status, _) => Err(SessionError::GameNotOngoing {
            game_id: game.id.clone(),
            status,
        }),
    }
}
