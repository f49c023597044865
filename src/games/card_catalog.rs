//! Card catalog: deterministic card templates and claim validation.
//!
//! A palette number fully determines its card. Numbers are derived from a
//! SHA-256 hash chain over the palette number and pool size, so every process
//! (and every restart) agrees on what a palette looks like.

use crate::common::types::{BallNumber, PaletteNumber};
use crate::config::GameConfig;
use crate::errors::CatalogError;
use crate::games::types::{Card, CardNumbers, FREE_CELL};
use rand::seq::index;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

const CARD_DOMAIN: &[u8] = b"bingo-card-v1";

/// Byte stream from a SHA-256 hash chain
struct PaletteRng {
    state: [u8; 32],
    index: usize,
}

impl PaletteRng {
    fn new(palette: PaletteNumber, pool_size: BallNumber) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(CARD_DOMAIN);
        hasher.update(palette.to_be_bytes());
        hasher.update([pool_size]);
        Self {
            state: hasher.finalize().into(),
            index: 0,
        }
    }

    fn next_byte(&mut self) -> u8 {
        if self.index >= 32 {
            let mut hasher = Sha256::new();
            hasher.update(self.state);
            self.state = hasher.finalize().into();
            self.index = 0;
        }
        let byte = self.state[self.index];
        self.index += 1;
        byte
    }

    /// Unbiased value in `0..max` by rejection sampling
    fn next_bounded(&mut self, max: u8) -> u8 {
        if max == 0 {
            return 0;
        }
        let limit = u8::MAX - (u8::MAX % max);
        loop {
            let value = self.next_byte();
            if value < limit {
                return value % max;
            }
        }
    }
}

/// A complete line on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum WinningLine {
    Row(usize),
    Column(usize),
    Diagonal(usize),
}

#[derive(Debug, Clone)]
pub struct CardCatalog {
    palette_count: PaletteNumber,
    pool_size: BallNumber,
}

impl CardCatalog {
    /// `pool_size` must be a positive multiple of five with at least five
    /// numbers per column; configuration validation guarantees that.
    pub fn new(palette_count: PaletteNumber, pool_size: BallNumber) -> Self {
        Self {
            palette_count,
            pool_size,
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.palette_count, config.pool_size)
    }

    pub fn palette_count(&self) -> PaletteNumber {
        self.palette_count
    }

    pub fn pool_size(&self) -> BallNumber {
        self.pool_size
    }

    fn column_span(&self) -> u8 {
        self.pool_size / 5
    }

    /// Numbers a column may hold, e.g. 16..=30 for column I of a 75-ball pool
    pub fn column_range(&self, col: usize) -> std::ops::RangeInclusive<BallNumber> {
        let span = self.column_span();
        let low = col as u8 * span + 1;
        low..=low + span - 1
    }

    pub fn generate_card(&self, palette: PaletteNumber) -> Result<Card, CatalogError> {
        if palette == 0 || palette > self.palette_count {
            return Err(CatalogError::InvalidPalette {
                palette,
                max: self.palette_count,
            });
        }

        let mut rng = PaletteRng::new(palette, self.pool_size);
        let mut columns = [[0u8; 5]; 5];
        for (col, column) in columns.iter_mut().enumerate() {
            // Partial Fisher-Yates over the column's range
            let mut candidates: Vec<BallNumber> = self.column_range(col).collect();
            for slot in 0..5 {
                let remaining = (candidates.len() - slot) as u8;
                let pick = slot + rng.next_bounded(remaining) as usize;
                candidates.swap(slot, pick);
            }
            let mut picked: Vec<BallNumber> = candidates[..5].to_vec();
            picked.sort_unstable();
            column.copy_from_slice(&picked);
        }
        columns[2][2] = FREE_CELL;

        Ok(Card {
            palette_number: palette,
            numbers: CardNumbers::from_columns(columns),
        })
    }

    /// Issue `n` cards with distinct palettes for one game.
    ///
    /// Palettes are sampled without replacement. A palette whose grid matches
    /// one already issued is skipped.
    pub fn issue_unique_cards<R>(&self, n: usize, rng: &mut R) -> Result<Vec<Card>, CatalogError>
    where
        R: Rng + ?Sized,
    {
        let available = self.palette_count as usize;
        if n > available {
            return Err(CatalogError::CatalogExhausted {
                requested: n,
                available,
            });
        }

        let mut cards = Vec::with_capacity(n);
        let mut grids = HashSet::with_capacity(n);
        for idx in index::sample(rng, available, available).into_iter() {
            if cards.len() == n {
                break;
            }
            let card = self.generate_card(idx as PaletteNumber + 1)?;
            if grids.insert(card.numbers.clone()) {
                cards.push(card);
            }
        }

        if cards.len() < n {
            return Err(CatalogError::CatalogExhausted {
                requested: n,
                available: cards.len(),
            });
        }
        Ok(cards)
    }

    /// Check that a card has the catalog's shape: five distinct numbers per
    /// column inside the column's range and the free cell in the centre.
    pub fn verify_structure(&self, card: &Card) -> Result<(), CatalogError> {
        let malformed = |reason: String| CatalogError::MalformedCard {
            palette: card.palette_number,
            reason,
        };

        for col in 0..5 {
            let range = self.column_range(col);
            let mut seen = HashSet::new();
            for (row, &n) in card.numbers.column(col).iter().enumerate() {
                if CardNumbers::is_free(row, col) {
                    if n != FREE_CELL {
                        return Err(malformed("centre cell is not free".to_string()));
                    }
                    continue;
                }
                if !range.contains(&n) {
                    return Err(malformed(format!("{} outside column {} range {:?}", n, col, range)));
                }
                if !seen.insert(n) {
                    return Err(malformed(format!("{} repeated in column {}", n, col)));
                }
            }
        }
        Ok(())
    }

    /// True iff some row, column or diagonal is fully covered by `drawn`
    /// (the free cell always counts as covered).
    pub fn validate_claim(card: &Card, drawn: &[BallNumber]) -> bool {
        !Self::winning_lines(card, drawn).is_empty()
    }

    pub fn winning_lines(card: &Card, drawn: &[BallNumber]) -> Vec<WinningLine> {
        let mut marked = [false; 256];
        for &n in drawn {
            marked[n as usize] = true;
        }
        let covered = |row: usize, col: usize| {
            CardNumbers::is_free(row, col) || marked[card.numbers.cell(row, col) as usize]
        };

        let mut lines = Vec::new();
        for row in 0..5 {
            if (0..5).all(|col| covered(row, col)) {
                lines.push(WinningLine::Row(row));
            }
        }
        for col in 0..5 {
            if (0..5).all(|row| covered(row, col)) {
                lines.push(WinningLine::Column(col));
            }
        }
        if (0..5).all(|i| covered(i, i)) {
            lines.push(WinningLine::Diagonal(0));
        }
        if (0..5).all(|i| covered(i, 4 - i)) {
            lines.push(WinningLine::Diagonal(1));
        }
        lines
    }
}
