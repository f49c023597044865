//! Periodic draws for every live game

use crate::common::traits::Ticker;
use crate::common::types::GameId;
use crate::errors::{BingoError, SessionError};
use crate::games::directory::SessionDirectory;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Ticks on a fixed period
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks whenever its handle is triggered; finishes when every handle is dropped
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct ManualTickHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    pub fn channel() -> (Self, ManualTickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTickHandle { tx })
    }
}

impl ManualTickHandle {
    pub fn trigger(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub drawn: usize,
    pub exhausted: Vec<GameId>,
    /// Games whose previous draw was still being processed
    pub skipped: usize,
    pub failed: usize,
}

pub struct DrawScheduler {
    directory: Arc<SessionDirectory>,
    stopped: AtomicBool,
}

impl DrawScheduler {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self {
            directory,
            stopped: AtomicBool::new(false),
        }
    }

    /// One draw for every live game
    pub fn draw_round(&self) -> RoundReport {
        let mut report = RoundReport::default();
        for game_id in self.directory.active_game_ids() {
            match self.directory.draw_next(&game_id) {
                Ok(_) => report.drawn += 1,
                Err(BingoError::Session(SessionError::NoMoreNumbers(id))) => report.exhausted.push(id),
                Err(BingoError::Session(SessionError::DrawInProgress(_))) => report.skipped += 1,
                // Completed by a claim or cancel between listing and drawing
                Err(BingoError::Session(SessionError::GameNotOngoing { .. }))
                | Err(BingoError::Session(SessionError::GameNotFound(_))) => {}
                Err(e) => {
                    warn!(game_id = %game_id, error = %e, "Scheduled draw failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn spawn(self: Arc<Self>, mut ticker: Box<dyn Ticker>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Draw scheduler started");
            while !self.is_stopped() && ticker.tick().await {
                if self.is_stopped() {
                    break;
                }
                let report = self.draw_round();
                if report.drawn > 0 || !report.exhausted.is_empty() {
                    debug!(
                        drawn = report.drawn,
                        exhausted = report.exhausted.len(),
                        skipped = report.skipped,
                        failed = report.failed,
                        "Draw round"
                    );
                }
            }
            info!("Draw scheduler stopped");
        })
    }
}
