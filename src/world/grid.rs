//! Grid of cells the robots live on.

use serde::{Deserialize, Serialize};

use crate::lang::Direction;

/// A coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// X coordinate (column).
    pub x: u16,
    /// Y coordinate (row).
    pub y: u16,
}

impl Coord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// The neighbouring coordinate in an absolute direction, if it stays on a
    /// `width` x `height` grid.
    #[must_use]
    pub fn step(self, dir: Direction, width: u16, height: u16) -> Option<Coord> {
        let (dx, dy) = dir.offset();
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        let x = u16::try_from(x).ok().filter(|&x| x < width)?;
        let y = u16::try_from(y).ok().filter(|&y| y < height)?;
        Some(Coord::new(x, y))
    }

    /// Whether `other` is this cell or one of its four neighbours.
    #[must_use]
    pub const fn within_reach(self, other: Coord) -> bool {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) <= 1
    }
}

/// Terrain underneath a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    /// Open ground.
    #[default]
    Ground,
    /// Impassable rock.
    Wall,
}

impl Terrain {
    /// Check if robots can stand on this terrain.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Terrain::Wall)
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
    /// Terrain type.
    pub terrain: Terrain,
    /// Entity lying in the cell, by name.
    pub entity: Option<String>,
}

impl Cell {
    /// Open ground holding an entity.
    #[must_use]
    pub fn with_entity(name: impl Into<String>) -> Self {
        Self {
            terrain: Terrain::Ground,
            entity: Some(name.into()),
        }
    }

    /// A wall cell.
    #[must_use]
    pub const fn wall() -> Self {
        Self {
            terrain: Terrain::Wall,
            entity: None,
        }
    }
}

/// The world grid, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a grid of open ground.
    ///
    /// Returns `None` if width or height is zero.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let size = usize::from(width) * usize::from(height);
        Some(Self {
            width,
            height,
            cells: vec![Cell::default(); size],
        })
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Check if a coordinate is within the grid.
    #[must_use]
    pub const fn in_bounds(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    fn index(&self, coord: Coord) -> Option<usize> {
        self.in_bounds(coord)
            .then(|| usize::from(coord.y) * usize::from(self.width) + usize::from(coord.x))
    }

    /// Get a cell.
    #[must_use]
    pub fn get(&self, coord: Coord) -> Option<&Cell> {
        self.index(coord).map(|i| &self.cells[i])
    }

    /// Get a mutable cell.
    #[must_use]
    pub fn get_mut(&mut self, coord: Coord) -> Option<&mut Cell> {
        self.index(coord).map(|i| &mut self.cells[i])
    }

    /// Replace a cell. Out-of-bounds writes are ignored.
    pub fn set(&mut self, coord: Coord, cell: Cell) {
        if let Some(slot) = self.get_mut(coord) {
            *slot = cell;
        }
    }

    /// Neighbour of `coord` in an absolute direction.
    #[must_use]
    pub fn step(&self, coord: Coord, dir: Direction) -> Option<Coord> {
        coord.step(dir, self.width, self.height)
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, &Cell)> {
        let width = usize::from(self.width);
        self.cells.iter().enumerate().map(move |(i, cell)| {
            #[allow(clippy::cast_possible_truncation)]
            let coord = Coord::new((i % width) as u16, (i / width) as u16);
            (coord, cell)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(4, 3).unwrap();
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        assert!(Grid::new(0, 3).is_none());
        assert_eq!(grid.iter().count(), 12);
    }

    #[test]
    fn test_step_stays_on_grid() {
        let grid = Grid::new(3, 3).unwrap();
        assert_eq!(
            grid.step(Coord::new(0, 0), Direction::East),
            Some(Coord::new(1, 0))
        );
        assert_eq!(grid.step(Coord::new(0, 0), Direction::North), None);
        assert_eq!(grid.step(Coord::new(2, 2), Direction::South), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut grid = Grid::new(3, 3).unwrap();
        grid.set(Coord::new(1, 1), Cell::with_entity("rock"));
        assert_eq!(
            grid.get(Coord::new(1, 1)).and_then(|c| c.entity.as_deref()),
            Some("rock")
        );
        grid.set(Coord::new(9, 9), Cell::wall());
        assert!(grid.get(Coord::new(9, 9)).is_none());
    }

    #[test]
    fn test_within_reach() {
        let c = Coord::new(2, 2);
        assert!(c.within_reach(Coord::new(2, 2)));
        assert!(c.within_reach(Coord::new(3, 2)));
        assert!(!c.within_reach(Coord::new(3, 3)));
    }
}
