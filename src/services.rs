//! Service layer: one owned object wiring the catalog, ledger, room registry
//! and session directory together. Handlers and binaries share it by `Arc`.

use crate::cache::StateCache;
use crate::common::config::ConfigLoader;
use crate::common::traits::{Clock, DocumentStore, SystemClock};
use crate::common::types::{Amount, GameId, PaletteNumber, UserId};
use crate::config::{BingoConfig, StorageBackend};
use crate::errors::{BingoResult, LedgerError};
use crate::events::{EventBus, GameEvent};
use crate::game_store;
use crate::games::card_catalog::CardCatalog;
use crate::games::directory::{RecoveryReport, SessionDirectory};
use crate::games::ledger::Ledger;
use crate::games::rooms::{RoomRegistry, RoomView};
use crate::games::session::{ClaimOutcome, DrawOutcome};
use crate::games::types::{Card, Game, Transaction, User};
use crate::metrics::BingoMetrics;
use crate::storage::{MemoryStore, RocksStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Result of joining a room: the updated room and the game it formed, if any
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub room: RoomView,
    pub game: Option<Game>,
}

pub struct BingoService {
    config: BingoConfig,
    catalog: Arc<CardCatalog>,
    ledger: Arc<Ledger>,
    rooms: Arc<RoomRegistry>,
    directory: Arc<SessionDirectory>,
    events: EventBus,
    cache: Arc<StateCache>,
    metrics: Arc<BingoMetrics>,
}

impl BingoService {
    pub fn config(&self) -> &BingoConfig {
        &self.config
    }

    pub fn directory(&self) -> Arc<SessionDirectory> {
        Arc::clone(&self.directory)
    }

    pub fn cache(&self) -> Arc<StateCache> {
        Arc::clone(&self.cache)
    }

    pub fn metrics(&self) -> Arc<BingoMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn register_user(&self, user_id: UserId, username: Option<String>, initial_balance: Amount) -> BingoResult<User> {
        self.ledger.register_user(user_id, username, initial_balance)
    }

    pub fn deposit(&self, user_id: UserId, amount: Amount) -> BingoResult<User> {
        self.ledger.deposit(user_id, amount)?;
        Ok(self.ledger.user(user_id)?)
    }

    pub fn withdraw(&self, user_id: UserId, amount: Amount) -> BingoResult<User> {
        self.ledger.withdraw(user_id, amount)?;
        Ok(self.ledger.user(user_id)?)
    }

    pub fn user(&self, user_id: UserId) -> BingoResult<User> {
        Ok(self.ledger.user(user_id)?)
    }

    pub fn history(&self, user_id: UserId, game_id: Option<&str>) -> BingoResult<Vec<Transaction>> {
        Ok(self.ledger.history(user_id, game_id)?)
    }

    /// Add a user to a room's lobby. With auto-start on, reaching the
    /// minimum forms a game right away; a failed formation does not fail
    /// the join.
    pub fn join_room(&self, room_id: &str, user_id: UserId) -> BingoResult<JoinOutcome> {
        let user = self.ledger.user(user_id)?;
        let room = self.rooms.get(room_id)?;
        if !user.can_afford(room.stake_amount) {
            return Err(LedgerError::InsufficientFunds {
                user_id,
                balance: user.balance,
                required: room.stake_amount,
            }
            .into());
        }

        let receipt = self.rooms.join_room(room_id, user_id, self.config.game.min_players)?;
        if let Err(e) = self.ledger.record_room_membership(user_id, &room.id, true) {
            warn!(room_id, user_id, error = %e, "Failed to record room membership");
        }
        self.metrics.room_joined();

        let mut game = None;
        if receipt.threshold_reached && self.config.game.auto_start {
            match self.directory.form(room_id) {
                Ok(formed) => game = Some(formed),
                Err(e) => info!(room_id, error = %e, "Automatic game formation did not start a game"),
            }
        }

        let view = self.rooms.view(room_id)?;
        self.cache.put_room(&view);
        Ok(JoinOutcome { room: view, game })
    }

    pub fn leave_room(&self, room_id: &str, user_id: UserId) -> BingoResult<bool> {
        let left = self.rooms.leave_room(room_id, user_id)?;
        if left {
            if let Err(e) = self.ledger.record_room_membership(user_id, &room_id.to_string(), false) {
                warn!(room_id, user_id, error = %e, "Failed to record room membership");
            }
            self.cache.put_room(&self.rooms.view(room_id)?);
        }
        Ok(left)
    }

    /// Form a game from the room's lobby now
    pub fn start_game(&self, room_id: &str) -> BingoResult<Game> {
        self.directory.form(room_id)
    }

    pub fn draw_next(&self, game_id: &str) -> BingoResult<DrawOutcome> {
        self.directory.draw_next(game_id)
    }

    pub fn claim_win(&self, game_id: &str, user_id: UserId, palette: PaletteNumber) -> BingoResult<ClaimOutcome> {
        self.directory.claim_win(game_id, user_id, palette)
    }

    pub fn get_game_state(&self, game_id: &str) -> BingoResult<Game> {
        self.directory.get_state(game_id)
    }

    pub fn cancel_game(&self, game_id: &str) -> BingoResult<Game> {
        self.directory.cancel(game_id)
    }

    pub fn active_games(&self) -> Vec<Game> {
        self.directory.active_games()
    }

    pub fn active_game_for_room(&self, room_id: &str) -> Option<GameId> {
        self.directory.active_game_for_room(room_id)
    }

    pub fn get_room(&self, room_id: &str) -> BingoResult<RoomView> {
        if let Some(view) = self.cache.room(room_id) {
            return Ok(view);
        }
        let view = self.rooms.view(room_id)?;
        self.cache.put_room(&view);
        Ok(view)
    }

    pub fn list_rooms(&self) -> Vec<RoomView> {
        self.rooms.list()
    }

    pub fn card(&self, palette: PaletteNumber) -> BingoResult<Card> {
        Ok(self.catalog.generate_card(palette)?)
    }

    pub fn recover(&self) -> BingoResult<RecoveryReport> {
        self.directory.recover()
    }

    /// Persist every live game before shutdown
    pub fn drain(&self) -> BingoResult<usize> {
        self.directory.drain()
    }

    pub fn user_count(&self) -> usize {
        self.ledger.user_count()
    }
}

/// Builds a [`BingoService`] from configuration
pub struct ServiceBuilder {
    config: Option<BingoConfig>,
    config_path: Option<String>,
    store_override: Option<Arc<dyn DocumentStore>>,
    clock: Arc<dyn Clock>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            config_path: None,
            store_override: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: BingoConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a TOML file plus environment overrides
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use this store instead of the configured backend
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> BingoResult<BingoService> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ConfigLoader::new().with_path(path).load()?,
            (None, None) => BingoConfig::default(),
        };
        config.validate()?;

        let store: Arc<dyn DocumentStore> = match self.store_override {
            Some(store) => store,
            None => match config.storage.backend {
                StorageBackend::RocksDb => Arc::new(RocksStore::open(&config.storage.data_directory, &config.storage)?),
                StorageBackend::Memory => Arc::new(MemoryStore::new()),
            },
        };
        let clock = self.clock;

        let ledger = Arc::new(Ledger::new(Arc::clone(&store), Arc::clone(&clock)));
        ledger.load()?;

        let rooms = Arc::new(RoomRegistry::new(Arc::clone(&store), Arc::clone(&clock)));
        let stored_rooms = game_store::load_rooms(store.as_ref())?;
        let known: Vec<String> = stored_rooms.iter().map(|r| r.id.clone()).collect();
        for room in stored_rooms {
            rooms.insert_room(room);
        }
        for seed in config.rooms.iter().filter(|seed| !known.contains(&seed.id)) {
            rooms.create_room(seed)?;
        }

        let catalog = Arc::new(CardCatalog::from_config(&config.game));
        let events = EventBus::default();
        let cache = Arc::new(StateCache::from_config(&config));
        let metrics = Arc::new(BingoMetrics::new()?);
        let directory = Arc::new(SessionDirectory::new(
            config.game.clone(),
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&rooms),
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            clock,
        ));

        info!(
            rooms = rooms.room_ids().len(),
            users = ledger.user_count(),
            backend = ?config.storage.backend,
            "Bingo service built"
        );

        Ok(BingoService {
            config,
            catalog,
            ledger,
            rooms,
            directory,
            events,
            cache,
            metrics,
        })
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::games::types::GameStatus;

    fn service() -> BingoService {
        ServiceBuilder::new()
            .with_config(BingoConfig::testing())
            .build()
            .unwrap()
    }

    #[test]
    fn test_rooms_are_seeded_from_config() {
        let service = service();
        let ids: Vec<_> = service.list_rooms().into_iter().map(|v| v.room.id).collect();
        assert_eq!(ids, vec!["bronze", "silver", "gold"]);
    }

    #[test]
    fn test_join_requires_registration_and_funds() {
        let service = service();
        assert_eq!(service.join_room("gold", 1).unwrap_err().kind(), ErrorKind::NotFound);

        service.register_user(1, None, 50).unwrap();
        assert_eq!(
            service.join_room("gold", 1).unwrap_err().kind(),
            ErrorKind::InsufficientFunds
        );
        assert!(service.get_room("gold").unwrap().room.current_player_ids.is_empty());
    }

    #[test]
    fn test_second_join_starts_game() {
        let service = service();
        service.register_user(1, None, 500).unwrap();
        service.register_user(2, None, 500).unwrap();

        let first = service.join_room("gold", 1).unwrap();
        assert!(first.game.is_none());
        assert_eq!(service.user(1).unwrap().joined_room_ids, vec!["gold".to_string()]);

        let second = service.join_room("gold", 2).unwrap();
        let game = second.game.unwrap();
        assert_eq!(game.status, GameStatus::Ongoing);
        assert!(second.room.room.current_player_ids.is_empty());
        assert_eq!(service.user(1).unwrap().balance, 400);
        assert!(service.user(1).unwrap().joined_room_ids.is_empty());
        assert_eq!(service.active_game_for_room("gold"), Some(game.id));
    }

    #[test]
    fn test_leave_room() {
        let service = service();
        service.register_user(1, None, 500).unwrap();
        service.join_room("gold", 1).unwrap();
        assert!(service.leave_room("gold", 1).unwrap());
        assert!(!service.leave_room("gold", 1).unwrap());
        assert_eq!(service.get_room("gold").unwrap().room.occupancy(), 0);
    }

    #[test]
    fn test_wallet_operations() {
        let service = service();
        service.register_user(1, Some("alice".to_string()), 0).unwrap();
        assert_eq!(service.deposit(1, 250).unwrap().balance, 250);
        assert_eq!(service.withdraw(1, 100).unwrap().balance, 150);
        assert_eq!(
            service.withdraw(1, 1_000).unwrap_err().kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(service.user_count(), 1);
    }

    #[test]
    fn test_card_lookup() {
        let service = service();
        let card = service.card(1).unwrap();
        assert_eq!(card.palette_number, 1);
        assert_eq!(service.card(0).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BingoConfig::testing();
        config.game.min_players = 1;
        assert!(ServiceBuilder::new().with_config(config).build().is_err());
    }
}
