//! Static map geometry

use serde::{Deserialize, Serialize};

/// A grid cell coordinate, serialized as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell(pub i32, pub i32);

impl Cell {
    pub fn x(self) -> i32 {
        self.0
    }

    pub fn y(self) -> i32 {
        self.1
    }
}

/// A static obstacle placed on the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    /// Footprint in grid cells before rotation: `[width, height]`
    #[serde(rename = "size")]
    pub footprint: [u32; 2],
    /// Top-left cell covered by the obstacle
    pub grid_position: Cell,
    /// Quarter turns (0..=3)
    #[serde(default)]
    pub rotation: u8,
}

impl Obstacle {
    pub fn new(footprint: [u32; 2], grid_position: Cell, rotation: u8) -> Self {
        Self {
            footprint,
            grid_position,
            rotation,
        }
    }

    /// Footprint after rotation; odd quarter turns swap width and height.
    pub fn effective_size(&self) -> (u32, u32) {
        let [w, h] = self.footprint;
        if self.rotation % 2 == 1 {
            (h, w)
        } else {
            (w, h)
        }
    }
}

/// Map definition shared verbatim with clients in `initPlayer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDefinition {
    /// Map size in map units: `[width, height]`
    pub size: [u32; 2],
    /// Grid subdivisions per map unit
    pub grid_division: u32,
    #[serde(rename = "items")]
    pub obstacles: Vec<Obstacle>,
}

/// Fence piece used throughout the yard
const FENCE: [u32; 2] = [4, 1];

impl MapDefinition {
    /// Grid dimensions in cells
    pub fn grid_size(&self) -> (u32, u32) {
        (
            self.size[0] * self.grid_division,
            self.size[1] * self.grid_division,
        )
    }

    /// The fenced yard: a 20x20 grid walled on every side with a small pen in the middle.
    pub fn yard() -> Self {
        let mut obstacles = Vec::new();

        for x in (0..20).step_by(4) {
            obstacles.push(Obstacle::new(FENCE, Cell(x, 0), 0));
        }
        for x in (0..20).step_by(4) {
            obstacles.push(Obstacle::new(FENCE, Cell(x, 19), 0));
        }
        for y in (0..20).step_by(4) {
            obstacles.push(Obstacle::new(FENCE, Cell(0, y), 1));
        }
        for y in (0..20).step_by(4) {
            obstacles.push(Obstacle::new(FENCE, Cell(19, y), 1));
        }

        // Center pen
        obstacles.push(Obstacle::new(FENCE, Cell(8, 8), 0));
        obstacles.push(Obstacle::new(FENCE, Cell(8, 11), 0));
        obstacles.push(Obstacle::new(FENCE, Cell(8, 8), 1));
        obstacles.push(Obstacle::new(FENCE, Cell(11, 8), 1));

        Self {
            size: [10, 10],
            grid_division: 2,
            obstacles,
        }
    }
}

impl Default for MapDefinition {
    fn default() -> Self {
        Self::yard()
    }
}
