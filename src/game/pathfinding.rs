//! A* pathfinding over the walkability grid
//!
//! Eight-directional movement with corner cutting disabled: a diagonal step
//! is only legal when both orthogonal cells it passes between are walkable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::grid::Grid;
use super::map::Cell;

/// Cost of an orthogonal step
const STRAIGHT_COST: u32 = 10;
/// Cost of a diagonal step (10 * sqrt(2), rounded down)
const DIAGONAL_COST: u32 = 14;

const STRAIGHT: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
const DIAGONAL: [(i32, i32); 4] = [(1, -1), (1, 1), (-1, 1), (-1, -1)];

/// Reasons a route could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("start cell {0:?} is blocked or out of bounds")]
    StartBlocked(Cell),

    #[error("end cell {0:?} is blocked or out of bounds")]
    EndBlocked(Cell),

    #[error("no route from {from:?} to {to:?}")]
    Unreachable { from: Cell, to: Cell },
}

/// Frontier entry. Ties on `f` prefer the node closer to the goal, then the
/// one discovered first, so results are stable for a given grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: u32,
    h: u32,
    seq: u64,
    idx: usize,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Octile distance, admissible for the step costs above
fn heuristic(a: Cell, b: Cell) -> u32 {
    let dx = a.x().abs_diff(b.x());
    let dy = a.y().abs_diff(b.y());
    let (min, max) = if dx < dy { (dx, dy) } else { (dy, dx) };
    STRAIGHT_COST * max + (DIAGONAL_COST - STRAIGHT_COST) * min
}

/// Stateless A* finder; every call searches its own copy of the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFinder;

impl PathFinder {
    pub fn new() -> Self {
        Self
    }

    /// Find a route from `start` to `end`, both inclusive.
    pub fn find_path(&self, grid: &Grid, start: Cell, end: Cell) -> Result<Vec<Cell>, PathError> {
        let snapshot = grid.clone();
        Search::new(snapshot).run(start, end)
    }
}

/// Working state of a single search
struct Search {
    grid: Grid,
    g: Vec<u32>,
    parent: Vec<Option<usize>>,
    closed: Vec<bool>,
    open: BinaryHeap<OpenNode>,
    seq: u64,
}

impl Search {
    fn new(grid: Grid) -> Self {
        let cells = grid.width() as usize * grid.height() as usize;
        Self {
            grid,
            g: vec![u32::MAX; cells],
            parent: vec![None; cells],
            closed: vec![false; cells],
            open: BinaryHeap::new(),
            seq: 0,
        }
    }

    fn cell_at(&self, idx: usize) -> Cell {
        let width = self.grid.width() as usize;
        Cell((idx % width) as i32, (idx / width) as i32)
    }

    fn push(&mut self, idx: usize, g: u32, h: u32) {
        self.open.push(OpenNode {
            f: g.saturating_add(h),
            h,
            seq: self.seq,
            idx,
        });
        self.seq += 1;
    }

    fn run(mut self, start: Cell, end: Cell) -> Result<Vec<Cell>, PathError> {
        let start_idx = self
            .grid
            .index(start)
            .filter(|_| self.grid.is_walkable(start))
            .ok_or(PathError::StartBlocked(start))?;
        let end_idx = self
            .grid
            .index(end)
            .filter(|_| self.grid.is_walkable(end))
            .ok_or(PathError::EndBlocked(end))?;

        self.g[start_idx] = 0;
        self.push(start_idx, 0, heuristic(start, end));

        while let Some(node) = self.open.pop() {
            if self.closed[node.idx] {
                continue;
            }
            self.closed[node.idx] = true;

            if node.idx == end_idx {
                return Ok(self.backtrace(end_idx));
            }

            let cell = self.cell_at(node.idx);
            for (next, step_cost) in self.neighbors(cell) {
                let Some(next_idx) = self.grid.index(next) else {
                    continue;
                };
                if self.closed[next_idx] {
                    continue;
                }

                let tentative = self.g[node.idx] + step_cost;
                if tentative < self.g[next_idx] {
                    self.g[next_idx] = tentative;
                    self.parent[next_idx] = Some(node.idx);
                    self.push(next_idx, tentative, heuristic(next, end));
                }
            }
        }

        Err(PathError::Unreachable {
            from: start,
            to: end,
        })
    }

    /// Walkable neighbors of `cell` with their step cost
    fn neighbors(&self, cell: Cell) -> Vec<(Cell, u32)> {
        let mut out = Vec::with_capacity(8);

        for (dx, dy) in STRAIGHT {
            let next = Cell(cell.x() + dx, cell.y() + dy);
            if self.grid.is_walkable(next) {
                out.push((next, STRAIGHT_COST));
            }
        }

        for (dx, dy) in DIAGONAL {
            let next = Cell(cell.x() + dx, cell.y() + dy);
            let side_a = Cell(cell.x() + dx, cell.y());
            let side_b = Cell(cell.x(), cell.y() + dy);
            if self.grid.is_walkable(next)
                && self.grid.is_walkable(side_a)
                && self.grid.is_walkable(side_b)
            {
                out.push((next, DIAGONAL_COST));
            }
        }

        out
    }

    fn backtrace(&self, end_idx: usize) -> Vec<Cell> {
        let mut path = vec![self.cell_at(end_idx)];
        let mut current = end_idx;
        while let Some(prev) = self.parent[current] {
            path.push(self.cell_at(prev));
            current = prev;
        }
        path.reverse();
        path
    }
}
