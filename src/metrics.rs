//! Prometheus metrics for game activity

use crate::errors::BingoResult;
use crate::games::types::GameOutcome;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Result label for claim attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult {
    Accepted,
    Repeated,
    Rejected,
    Late,
}

impl ClaimResult {
    fn label(&self) -> &'static str {
        match self {
            ClaimResult::Accepted => "accepted",
            ClaimResult::Repeated => "repeated",
            ClaimResult::Rejected => "rejected",
            ClaimResult::Late => "late",
        }
    }
}

pub struct BingoMetrics {
    registry: Registry,
    games_started: IntCounter,
    games_completed: IntCounterVec,
    formations_aborted: IntCounter,
    numbers_drawn: IntCounter,
    claims: IntCounterVec,
    room_joins: IntCounter,
    active_games: IntGauge,
}

impl BingoMetrics {
    pub fn new() -> BingoResult<Self> {
        let registry = Registry::new_custom(Some("bingo".to_string()), None)?;

        let games_started = IntCounter::new("games_started_total", "Games that reached ONGOING")?;
        let games_completed = IntCounterVec::new(
            Opts::new("games_completed_total", "Completed games by outcome"),
            &["outcome"],
        )?;
        let formations_aborted = IntCounter::new(
            "formations_aborted_total",
            "Formations aborted for lack of paying players",
        )?;
        let numbers_drawn = IntCounter::new("numbers_drawn_total", "Numbers drawn across all games")?;
        let claims = IntCounterVec::new(Opts::new("claims_total", "Bingo claims by result"), &["result"])?;
        let room_joins = IntCounter::new("room_joins_total", "Successful room joins")?;
        let active_games = IntGauge::new("active_games", "Games currently in memory")?;

        registry.register(Box::new(games_started.clone()))?;
        registry.register(Box::new(games_completed.clone()))?;
        registry.register(Box::new(formations_aborted.clone()))?;
        registry.register(Box::new(numbers_drawn.clone()))?;
        registry.register(Box::new(claims.clone()))?;
        registry.register(Box::new(room_joins.clone()))?;
        registry.register(Box::new(active_games.clone()))?;

        Ok(Self {
            registry,
            games_started,
            games_completed,
            formations_aborted,
            numbers_drawn,
            claims,
            room_joins,
            active_games,
        })
    }

    pub fn game_started(&self) {
        self.games_started.inc();
        self.active_games.inc();
    }

    pub fn game_completed(&self, outcome: GameOutcome) {
        let label = match outcome {
            GameOutcome::Won => "won",
            GameOutcome::PoolExhausted => "pool_exhausted",
            GameOutcome::Cancelled => "cancelled",
        };
        self.games_completed.with_label_values(&[label]).inc();
        self.active_games.dec();
    }

    pub fn formation_aborted(&self) {
        self.formations_aborted.inc();
    }

    pub fn number_drawn(&self) {
        self.numbers_drawn.inc();
    }

    pub fn claim(&self, result: ClaimResult) {
        self.claims.with_label_values(&[result.label()]).inc();
    }

    pub fn room_joined(&self) {
        self.room_joins.inc();
    }

    /// Games restored into memory at startup
    pub fn set_active_games(&self, count: usize) {
        self.active_games.set(count as i64);
    }

    pub fn active_games(&self) -> i64 {
        self.active_games.get()
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> BingoResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = BingoMetrics::new().unwrap();
        metrics.game_started();
        metrics.game_started();
        metrics.game_completed(GameOutcome::Won);
        metrics.number_drawn();
        metrics.claim(ClaimResult::Rejected);

        assert_eq!(metrics.active_games(), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("bingo_games_started_total 2"));
        assert!(text.contains("bingo_games_completed_total{outcome=\"won\"} 1"));
        assert!(text.contains("bingo_claims_total{result=\"rejected\"} 1"));
        assert!(text.contains("bingo_active_games 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = BingoMetrics::new().unwrap();
        let b = BingoMetrics::new().unwrap();
        a.room_joined();
        assert!(b.render().unwrap().contains("bingo_room_joins_total 0"));
    }
}
