//! Session directory: owns the live game sessions and drives their
//! lifecycle against the ledger, the room registry and the store.
//!
//! Order of effects for a game:
//!
//! 1. Formation persists a `WAITING` record before the first stake is
//!    collected, so a crash mid-formation can be refunded on recovery.
//! 2. Every draw and every transition is persisted after the in-memory
//!    change. The in-memory session is authoritative while it lives.
//! 3. Completion persists the final record, applies its settlement through
//!    idempotent ledger entries and then marks the record `settled`.

use crate::cache::StateCache;
use crate::common::traits::{Clock, DocumentStore};
use crate::common::types::{new_game_id, GameId, PaletteNumber, RoomId, UserId};
use crate::config::GameConfig;
use crate::errors::{BingoError, BingoResult, SessionError};
use crate::events::{EventBus, GameEvent};
use crate::game_store;
use crate::games::card_catalog::CardCatalog;
use crate::games::ledger::Ledger;
use crate::games::rooms::{FormationTicket, RoomRegistry};
use crate::games::session::{resolve_closed_claim, settlement_for, ClaimOutcome, DrawOutcome, GameSession, Settlement};
use crate::games::types::{Game, GameOutcome, GameStatus, LedgerReason};
use crate::metrics::{BingoMetrics, ClaimResult};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// What `recover` did with each persisted game
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Ongoing games brought back into memory
    pub restored: Vec<GameId>,
    /// Games interrupted mid-formation, refunded and cancelled
    pub refunded: Vec<GameId>,
    /// Completed games whose settlement was re-applied
    pub resettled: Vec<GameId>,
    /// Records that could not be decoded or failed their invariants
    pub corrupt: Vec<GameId>,
}

pub struct SessionDirectory {
    sessions: DashMap<GameId, Arc<GameSession>>,
    room_games: DashMap<RoomId, GameId>,
    catalog: Arc<CardCatalog>,
    ledger: Arc<Ledger>,
    rooms: Arc<RoomRegistry>,
    store: Arc<dyn DocumentStore>,
    events: EventBus,
    cache: Arc<StateCache>,
    metrics: Arc<BingoMetrics>,
    clock: Arc<dyn Clock>,
    config: GameConfig,
    seeds: Mutex<StdRng>,
}

impl SessionDirectory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: GameConfig,
        catalog: Arc<CardCatalog>,
        ledger: Arc<Ledger>,
        rooms: Arc<RoomRegistry>,
        store: Arc<dyn DocumentStore>,
        events: EventBus,
        cache: Arc<StateCache>,
        metrics: Arc<BingoMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let seeds = match config.draw_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sessions: DashMap::new(),
            room_games: DashMap::new(),
            catalog,
            ledger,
            rooms,
            store,
            events,
            cache,
            metrics,
            clock,
            config,
            seeds: Mutex::new(seeds),
        }
    }

    /// Independent generator for one game, derived from the directory seed
    fn next_rng(&self) -> StdRng {
        let mut seeds = self.seeds.lock().unwrap_or_else(PoisonError::into_inner);
        StdRng::seed_from_u64(seeds.next_u64())
    }

    fn session(&self, game_id: &str) -> Option<Arc<GameSession>> {
        self.sessions.get(game_id).map(|s| Arc::clone(s.value()))
    }

    /// Session for an action that needs a live game. Completed games that
    /// were already released report `GameNotOngoing`.
    fn live_session(&self, game_id: &str) -> BingoResult<Arc<GameSession>> {
        if let Some(session) = self.session(game_id) {
            return Ok(session);
        }
        match game_store::load_game(self.store.as_ref(), game_id)? {
            Some(game) => Err(SessionError::GameNotOngoing {
                game_id: game.id,
                status: game.status,
            }
            .into()),
            None => Err(SessionError::GameNotFound(game_id.to_string()).into()),
        }
    }

    fn persist(&self, game: &Game) {
        if let Err(e) = game_store::store_game(self.store.as_ref(), game) {
            warn!(game_id = %game.id, error = %e, "Failed to persist game record");
        }
        self.cache.put_game(game);
    }

    fn refresh_room(&self, room_id: &str) {
        match self.rooms.view(room_id) {
            Ok(view) => self.cache.put_room(&view),
            Err(_) => self.cache.invalidate_room(room_id),
        }
    }

    /// Active game of a room, forming one if the room has none
    pub fn get_or_create(&self, room_id: &str) -> BingoResult<GameId> {
        if let Some(game_id) = self.room_games.get(room_id) {
            return Ok(game_id.clone());
        }
        self.form(room_id).map(|game| game.id)
    }

    pub fn active_game_for_room(&self, room_id: &str) -> Option<GameId> {
        self.room_games.get(room_id).map(|g| g.clone())
    }

    /// Form a game from the room's current lobby.
    ///
    /// Each occupant pays the stake or is dropped from the lobby. If fewer
    /// than `min_players` pay, the collected stakes are refunded and the
    /// formation fails with `FormationAborted`.
    pub fn form(&self, room_id: &str) -> BingoResult<Game> {
        let ticket = self.rooms.begin_formation(room_id, self.config.min_players)?;
        let game_id = new_game_id();
        let session = GameSession::new(
            game_id.clone(),
            ticket.room_id.clone(),
            ticket.stake_amount,
            self.config.pool_size,
            self.next_rng(),
            Arc::clone(&self.clock),
            self.config.exhausted_pool_policy,
        );

        if let Err(e) = game_store::store_game(self.store.as_ref(), &session.snapshot()) {
            self.rooms.abort_formation(room_id);
            return Err(e);
        }

        let paid = self.collect_stakes(&ticket, &game_id);
        if paid.len() < self.config.min_players {
            warn!(room_id, game_id = %game_id, paying = paid.len(), "Not enough paying players, aborting formation");
            self.abort(&ticket, &game_id, &paid);
            return Err(SessionError::FormationAborted {
                room_id: room_id.to_string(),
                paying: paid.len(),
            }
            .into());
        }

        if let Err(e) = self.seat_players(&session, &paid) {
            error!(room_id, game_id = %game_id, error = %e, "Failed to seat players, aborting formation");
            self.abort(&ticket, &game_id, &paid);
            return Err(e);
        }

        let game = match session.start(self.config.min_players) {
            Ok(game) => game,
            Err(e) => {
                self.abort(&ticket, &game_id, &paid);
                return Err(e.into());
            }
        };
        self.persist(&game);

        if let Err(e) = self.rooms.complete_formation(room_id, &game_id, &paid) {
            warn!(room_id, game_id = %game_id, error = %e, "Failed to persist lobby after formation");
        }
        for user_id in &paid {
            if let Err(e) = self.ledger.record_room_membership(*user_id, &ticket.room_id, false) {
                debug!(user_id, error = %e, "Failed to update room membership");
            }
        }
        self.sessions.insert(game_id.clone(), Arc::new(session));
        self.room_games.insert(ticket.room_id.clone(), game_id.clone());
        self.refresh_room(room_id);
        self.metrics.game_started();

        self.events.publish(GameEvent::GameStarted {
            game_id: game_id.clone(),
            room_id: ticket.room_id.clone(),
            player_ids: game.player_ids(),
        });
        info!(room_id, game_id = %game_id, players = paid.len(), pot = game.pot(), "Game formed");
        Ok(game)
    }

    /// Debit every occupant. Players whose debit fails leave the lobby.
    fn collect_stakes(&self, ticket: &FormationTicket, game_id: &str) -> Vec<UserId> {
        let mut paid = Vec::with_capacity(ticket.occupants.len());
        for &user_id in &ticket.occupants {
            match self
                .ledger
                .debit(user_id, ticket.stake_amount, LedgerReason::StakeCollected, Some(game_id))
            {
                Ok(_) => paid.push(user_id),
                Err(e) => {
                    info!(room_id = %ticket.room_id, user_id, error = %e, "Stake collection failed, excluding player");
                    if let Err(e) = self.rooms.exclude(&ticket.room_id, user_id) {
                        warn!(room_id = %ticket.room_id, user_id, error = %e, "Failed to release room slot");
                    }
                    if let Err(e) = self.ledger.record_room_membership(user_id, &ticket.room_id, false) {
                        debug!(user_id, error = %e, "Failed to update room membership");
                    }
                }
            }
        }
        paid
    }

    fn seat_players(&self, session: &GameSession, paid: &[UserId]) -> BingoResult<()> {
        let per_player = self.config.cards_per_player;
        let cards = {
            let mut rng = self.next_rng();
            self.catalog
                .issue_unique_cards(paid.len() * per_player, &mut rng)
                .map_err(SessionError::from)?
        };
        for (user_id, hand) in paid.iter().zip(cards.chunks(per_player)) {
            let palettes: Vec<PaletteNumber> = hand.iter().map(|c| c.palette_number).collect();
            session.add_player(*user_id, palettes)?;
        }
        Ok(())
    }

    /// Refund the paying players and drop the `WAITING` record
    fn abort(&self, ticket: &FormationTicket, game_id: &str, paid: &[UserId]) {
        let mut refunded_all = true;
        for &user_id in paid {
            if let Err(e) = self
                .ledger
                .credit(user_id, ticket.stake_amount, Some(game_id), LedgerReason::StakeRefunded)
            {
                refunded_all = false;
                error!(game_id, user_id, error = %e, "Failed to refund stake");
            }
        }
        // An unrefunded record stays behind for recovery
        if refunded_all {
            if let Err(e) = game_store::delete_game(self.store.as_ref(), game_id) {
                warn!(game_id, error = %e, "Failed to delete aborted game record");
            }
        }
        self.rooms.abort_formation(&ticket.room_id);
        self.refresh_room(&ticket.room_id);
        self.metrics.formation_aborted();
    }

    /// Draw the next number. Exhausting the pool completes the game and
    /// returns `NoMoreNumbers`.
    pub fn draw_next(&self, game_id: &str) -> BingoResult<DrawOutcome> {
        let session = self.live_session(game_id)?;
        let permit = session.begin_draw()?;
        match permit.draw() {
            Ok(outcome) => {
                self.persist(&session.snapshot());
                self.metrics.number_drawn();
                self.events.publish(GameEvent::NumberDrawn {
                    game_id: game_id.to_string(),
                    room_id: session.room_id().to_string(),
                    number: outcome.number,
                    draw_index: outcome.draw_index,
                });
                Ok(outcome)
            }
            Err(SessionError::NoMoreNumbers(id)) => {
                drop(permit);
                self.on_completed(game_id)?;
                Err(SessionError::NoMoreNumbers(id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn claim_win(&self, game_id: &str, user_id: UserId, palette: PaletteNumber) -> BingoResult<ClaimOutcome> {
        let Some(session) = self.session(game_id) else {
            return self.claim_on_record(game_id, user_id, palette);
        };

        match session.claim_win(user_id, palette, &self.catalog) {
            Ok(outcome) if outcome.newly_completed => {
                self.metrics.claim(ClaimResult::Accepted);
                self.on_completed(game_id)?;
                Ok(outcome)
            }
            Ok(outcome) => {
                self.metrics.claim(ClaimResult::Repeated);
                Ok(outcome)
            }
            Err(e) => {
                let result = match e {
                    SessionError::GameAlreadyCompleted(_) => ClaimResult::Late,
                    _ => ClaimResult::Rejected,
                };
                self.metrics.claim(result);
                debug!(game_id, user_id, palette, error = %e, "Claim rejected");
                Err(e.into())
            }
        }
    }

    /// Claim against a game that is no longer in memory
    fn claim_on_record(&self, game_id: &str, user_id: UserId, palette: PaletteNumber) -> BingoResult<ClaimOutcome> {
        let game = game_store::load_game(self.store.as_ref(), game_id)?
            .ok_or_else(|| SessionError::GameNotFound(game_id.to_string()))?;
        match resolve_closed_claim(&game, user_id, palette) {
            Ok(Some(outcome)) => {
                self.metrics.claim(ClaimResult::Repeated);
                Ok(outcome)
            }
            Ok(None) => Err(SessionError::CorruptState {
                game_id: game_id.to_string(),
                reason: "ongoing record without a live session".to_string(),
            }
            .into()),
            Err(e) => {
                self.metrics.claim(ClaimResult::Late);
                Err(e.into())
            }
        }
    }

    /// Force-complete a game and refund every stake
    pub fn cancel(&self, game_id: &str) -> BingoResult<Game> {
        let session = self.live_session(game_id)?;
        session.cancel()?;
        self.on_completed(game_id)
    }

    /// Settle a completed game and release it from memory.
    ///
    /// Only the caller that takes the settlement does the work; concurrent
    /// callers get the current snapshot back.
    pub fn on_completed(&self, game_id: &str) -> BingoResult<Game> {
        let session = self
            .session(game_id)
            .ok_or_else(|| SessionError::GameNotFound(game_id.to_string()))?;
        let mut game = session.snapshot();
        if !game.is_completed() {
            return Ok(game);
        }
        let Some(settlement) = session.take_settlement() else {
            return Ok(game);
        };

        self.persist(&game);
        match self.apply_settlement(&game.id, &settlement) {
            Ok(()) => {
                game.settled = true;
                self.persist(&game);
            }
            Err(e) => error!(game_id, error = %e, "Settlement incomplete, left for recovery"),
        }

        self.sessions.remove(game_id);
        self.room_games.remove_if(&game.room_id, |_, active| active == game_id);
        self.rooms.release(&game.room_id, game_id);
        self.refresh_room(&game.room_id);

        let outcome = game.outcome.unwrap_or(GameOutcome::Cancelled);
        self.metrics.game_completed(outcome);
        self.events.publish(GameEvent::GameCompleted {
            game_id: game.id.clone(),
            room_id: game.room_id.clone(),
            outcome,
            winner: game.winner.clone(),
        });
        info!(game_id, room_id = %game.room_id, ?outcome, "Game completed");

        if self.config.auto_start && self.rooms.ready(&game.room_id, self.config.min_players) {
            if let Err(e) = self.form(&game.room_id) {
                warn!(room_id = %game.room_id, error = %e, "Next game could not be formed");
            }
        }
        Ok(game)
    }

    /// Apply a settlement. Every entry is idempotent per game, so this is
    /// safe to repeat for a partially settled game.
    fn apply_settlement(&self, game_id: &str, settlement: &Settlement) -> BingoResult<()> {
        match settlement {
            Settlement::Payout { winner, amount } => {
                if *amount > 0 {
                    self.ledger.credit(*winner, *amount, Some(game_id), LedgerReason::Payout)?;
                }
                info!(game_id, winner, amount, "Pot paid out");
            }
            Settlement::Refund { players, stake } => {
                let mut first_error: Option<BingoError> = None;
                for &user_id in players {
                    if let Err(e) = self
                        .ledger
                        .credit(user_id, *stake, Some(game_id), LedgerReason::StakeRefunded)
                    {
                        error!(game_id, user_id, error = %e, "Refund failed");
                        first_error.get_or_insert(e);
                    }
                }
                if let Some(e) = first_error {
                    return Err(e);
                }
                info!(game_id, players = players.len(), stake, "Stakes refunded");
            }
            Settlement::Forfeit { pot } => {
                info!(game_id, pot, "Pot forfeited");
            }
        }
        Ok(())
    }

    /// Current view of a game: live session, then cache, then store
    pub fn get_state(&self, game_id: &str) -> BingoResult<Game> {
        if let Some(session) = self.session(game_id) {
            return Ok(session.snapshot());
        }
        if let Some(game) = self.cache.game(game_id) {
            return Ok(game);
        }
        let game = game_store::load_game(self.store.as_ref(), game_id)?
            .ok_or_else(|| SessionError::GameNotFound(game_id.to_string()))?;
        self.cache.put_game(&game);
        Ok(game)
    }

    pub fn active_games(&self) -> Vec<Game> {
        let sessions: Vec<Arc<GameSession>> = self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        sessions.iter().map(|s| s.snapshot()).collect()
    }

    pub fn active_game_ids(&self) -> Vec<GameId> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    /// Rebuild a live game from its persisted record, dropping the
    /// in-memory instance
    pub fn resync(&self, game_id: &str) -> BingoResult<Game> {
        let game = game_store::load_game(self.store.as_ref(), game_id)?
            .ok_or_else(|| SessionError::GameNotFound(game_id.to_string()))?;
        if game.status != GameStatus::Ongoing {
            return self.retire(game);
        }
        self.install(game.clone())?;
        info!(game_id, drawn = game.drawn_numbers.len(), "Game resynced from store");
        Ok(game)
    }

    /// Drop the live instance of a game whose record is no longer ongoing
    /// and settle the record the way recovery would.
    fn retire(&self, game: Game) -> BingoResult<Game> {
        let game_id = game.id.clone();
        let room_id = game.room_id.clone();
        self.sessions.remove(&game_id);
        self.room_games.remove_if(&room_id, |_, active| *active == game_id);
        self.rooms.release(&room_id, &game_id);

        let game = match game.status {
            GameStatus::Waiting => self.cancel_interrupted(game)?,
            GameStatus::Completed if !game.settled => self.resettle(game)?,
            _ => game,
        };
        self.cache.put_game(&game);
        self.refresh_room(&room_id);
        self.metrics.set_active_games(self.sessions.len());
        warn!(game_id = %game_id, room_id = %room_id, status = %game.status, "Live game dropped on resync");
        Ok(game)
    }

    fn install(&self, game: Game) -> BingoResult<()> {
        let game_id = game.id.clone();
        let room_id = game.room_id.clone();
        let session = GameSession::restore(
            game,
            self.next_rng(),
            Arc::clone(&self.clock),
            self.config.exhausted_pool_policy,
        )?;
        self.rooms
            .mark_in_game(&room_id, &game_id)
            .map_err(BingoError::from)?;
        self.room_games.insert(room_id, game_id.clone());
        self.sessions.insert(game_id, Arc::new(session));
        Ok(())
    }

    /// Bring persisted games back after a restart.
    ///
    /// Ongoing games resume, games left in `WAITING` by an interrupted
    /// formation are refunded and cancelled, and completed games that were
    /// not fully settled are settled again.
    pub fn recover(&self) -> BingoResult<RecoveryReport> {
        let (games, corrupt) = game_store::load_games(self.store.as_ref())?;
        let mut report = RecoveryReport::default();
        for (game_id, e) in corrupt {
            error!(game_id = %game_id, error = %e, "Unreadable game record");
            report.corrupt.push(game_id);
        }

        for game in games {
            let game_id = game.id.clone();
            let status = game.status;
            let result = match status {
                GameStatus::Ongoing => self.install(game).map(|_| report.restored.push(game_id.clone())),
                GameStatus::Waiting => self
                    .cancel_interrupted(game)
                    .map(|_| report.refunded.push(game_id.clone())),
                GameStatus::Completed if !game.settled => self
                    .resettle(game)
                    .map(|_| report.resettled.push(game_id.clone())),
                GameStatus::Completed => Ok(()),
            };
            if let Err(e) = result {
                error!(game_id = %game_id, error = %e, "Failed to recover game");
                report.corrupt.push(game_id);
            }
        }

        self.metrics.set_active_games(self.sessions.len());
        info!(
            restored = report.restored.len(),
            refunded = report.refunded.len(),
            resettled = report.resettled.len(),
            corrupt = report.corrupt.len(),
            "Recovery finished"
        );
        Ok(report)
    }

    fn cancel_interrupted(&self, mut game: Game) -> BingoResult<Game> {
        for (user_id, stake) in self.ledger.outstanding_stakes(&game.id) {
            self.ledger
                .credit(user_id, stake, Some(&game.id), LedgerReason::StakeRefunded)?;
        }
        let now = self.clock.now();
        game.status = GameStatus::Completed;
        game.outcome = Some(GameOutcome::Cancelled);
        game.end_time = Some(now);
        game.updated_at = now;
        game.settled = true;
        game_store::store_game(self.store.as_ref(), &game)?;
        warn!(game_id = %game.id, room_id = %game.room_id, "Interrupted formation refunded");
        Ok(game)
    }

    fn resettle(&self, mut game: Game) -> BingoResult<Game> {
        game.verify_integrity().map_err(|reason| SessionError::CorruptState {
            game_id: game.id.clone(),
            reason,
        })?;
        if let Some(settlement) = settlement_for(&game, self.config.exhausted_pool_policy) {
            self.apply_settlement(&game.id, &settlement)?;
        }
        game.settled = true;
        game_store::store_game(self.store.as_ref(), &game)?;
        Ok(game)
    }

    /// Persist every live game. Returns how many were written.
    pub fn drain(&self) -> BingoResult<usize> {
        let mut written = 0;
        let mut first_error = None;
        for game in self.active_games() {
            match game_store::store_game(self.store.as_ref(), &game) {
                Ok(()) => written += 1,
                Err(e) => {
                    error!(game_id = %game.id, error = %e, "Failed to persist game on drain");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!(games = written, "Session directory drained");
                Ok(written)
            }
        }
    }
}
