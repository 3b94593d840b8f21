//! Walkability grid built from map obstacles

use super::map::{Cell, MapDefinition};

/// Boolean walkability field, row-major.
///
/// Built once at startup and shared read-only. Searches work on their own
/// clone so nothing they do can leak back into the shared grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    walkable: Vec<bool>,
}

impl Grid {
    /// Fully walkable grid of the given size
    pub fn open(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            walkable: vec![true; width as usize * height as usize],
        }
    }

    /// Build the grid for a map by stamping every obstacle's rotated footprint.
    pub fn build(map: &MapDefinition) -> Self {
        let (width, height) = map.grid_size();
        let mut grid = Self::open(width, height);

        for obstacle in &map.obstacles {
            let (w, h) = obstacle.effective_size();
            let origin = obstacle.grid_position;
            for dx in 0..w as i32 {
                for dy in 0..h as i32 {
                    grid.set_walkable(Cell(origin.x() + dx, origin.y() + dy), false);
                }
            }
        }

        grid
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Out-of-bounds cells are never walkable.
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.index(cell).map_or(false, |idx| self.walkable[idx])
    }

    /// Out-of-bounds writes are ignored (obstacles may overhang the edge).
    pub fn set_walkable(&mut self, cell: Cell, walkable: bool) {
        if let Some(idx) = self.index(cell) {
            self.walkable[idx] = walkable;
        }
    }

    pub fn walkable_count(&self) -> usize {
        self.walkable.iter().filter(|w| **w).count()
    }

    pub(crate) fn index(&self, cell: Cell) -> Option<usize> {
        let (x, y) = (cell.x(), cell.y());
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}
