//! Random walkable cell selection by rejection sampling

use rand::Rng;

use super::grid::Grid;
use super::map::{Cell, MapDefinition};

/// Default number of draws before giving up
pub const SPAWN_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("no walkable cell found after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Draws uniformly over the whole grid and keeps the first walkable hit.
#[derive(Debug, Clone, Copy)]
pub struct SpawnSampler {
    max_attempts: u32,
}

impl SpawnSampler {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Sample a walkable cell of `grid` over the coordinate space of `map`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        map: &MapDefinition,
        grid: &Grid,
        rng: &mut R,
    ) -> Result<Cell, SpawnError> {
        let (width, height) = map.grid_size();
        self.sample_with(width, height, rng, |cell| grid.is_walkable(cell))
    }

    /// Core sampling loop; `accept` is asked once per draw.
    pub fn sample_with<R, F>(
        &self,
        width: u32,
        height: u32,
        rng: &mut R,
        mut accept: F,
    ) -> Result<Cell, SpawnError>
    where
        R: Rng + ?Sized,
        F: FnMut(Cell) -> bool,
    {
        if width > 0 && height > 0 {
            for _ in 0..self.max_attempts {
                let cell = Cell(
                    rng.gen_range(0..width) as i32,
                    rng.gen_range(0..height) as i32,
                );
                if accept(cell) {
                    return Ok(cell);
                }
            }
        }

        Err(SpawnError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for SpawnSampler {
    fn default() -> Self {
        Self::new(SPAWN_ATTEMPTS)
    }
}
