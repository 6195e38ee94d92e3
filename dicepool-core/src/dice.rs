//! Dice pool rolling.
//!
//! A pool is a number of six-sided dice rolled together. Every die showing
//! 5 or 6 is a hit. When more than half of the dice show a 1 the roll
//! glitches; a glitch without any hits is a critical glitch.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Lowest face counted as a hit.
pub const HIT_FACE: u8 = 5;

/// Error type for dice construction.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Invalid die face: {0} (expected 1-6)")]
    InvalidFace(u8),
}

/// Something that can throw six-sided dice.
///
/// The engine never talks to `rand` directly so tests can script results.
pub trait DiceSource: Send + Sync {
    /// Roll `count` six-sided dice and return their faces.
    fn roll_d6(&self, count: usize) -> Vec<u8>;
}

/// Dice backed by a real random number generator.
pub struct RandomDice {
    rng: Mutex<StdRng>,
}

impl RandomDice {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic dice, useful for reproducible sessions.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomDice {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceSource for RandomDice {
    fn roll_d6(&self, count: usize) -> Vec<u8> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (0..count).map(|_| rng.gen_range(1..=6u8)).collect()
    }
}

/// Result of rolling a dice pool once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicePoolRoll {
    pub dice: Vec<u8>,
    pub hits: u32,
    pub ones: u32,
    pub glitch: bool,
    pub critical_glitch: bool,
}

impl DicePoolRoll {
    /// Build a roll from already thrown dice.
    pub fn from_faces(dice: Vec<u8>) -> Result<Self, DiceError> {
        if let Some(&face) = dice.iter().find(|&&d| !(1..=6).contains(&d)) {
            return Err(DiceError::InvalidFace(face));
        }

        let hits = dice.iter().filter(|&&d| d >= HIT_FACE).count() as u32;
        let ones = dice.iter().filter(|&&d| d == 1).count() as u32;
        let glitch = !dice.is_empty() && ones as usize * 2 > dice.len();

        Ok(Self {
            dice,
            hits,
            ones,
            glitch,
            critical_glitch: glitch && hits == 0,
        })
    }

    /// Roll a pool using the given dice source.
    ///
    /// Negative pools roll no dice at all.
    pub fn roll_with<D: DiceSource + ?Sized>(pool: i32, source: &D) -> Self {
        let count = pool.max(0) as usize;
        let dice = source.roll_d6(count);
        Self::checked(count, dice)
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng>(pool: i32, rng: &mut R) -> Self {
        let count = pool.max(0) as usize;
        let dice = (0..count).map(|_| rng.gen_range(1..=6u8)).collect();
        Self::checked(count, dice)
    }

    fn checked(count: usize, mut dice: Vec<u8>) -> Self {
        // A misbehaving source must not break a roll; clamp to valid faces.
        dice.truncate(count);
        for die in dice.iter_mut() {
            *die = (*die).clamp(1, 6);
        }
        Self::from_faces(dice).unwrap_or_else(|_| Self::empty())
    }

    fn empty() -> Self {
        Self {
            dice: Vec::new(),
            hits: 0,
            ones: 0,
            glitch: false,
            critical_glitch: false,
        }
    }

    /// Hits after applying a limit. A limit of zero or less means "no limit".
    pub fn limited_hits(&self, limit: i32) -> u32 {
        if limit > 0 {
            self.hits.min(limit as u32)
        } else {
            self.hits
        }
    }

    /// Format the individual dice for display, hits first.
    pub fn dice_display(&self) -> String {
        let mut sorted = self.dice.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        format!(
            "[{}]",
            sorted
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl fmt::Display for DicePoolRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} hits", self.dice_display(), self.hits)?;
        if self.critical_glitch {
            write!(f, " (critical glitch)")
        } else if self.glitch {
            write!(f, " (glitch)")
        } else {
            Ok(())
        }
    }
}

/// Convenience function to roll a pool with fresh randomness.
pub fn roll_pool(pool: i32) -> DicePoolRoll {
    DicePoolRoll::roll_with_rng(pool, &mut rand::thread_rng())
}
