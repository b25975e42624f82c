//! Absolute and relative directions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A direction literal.
///
/// The four cardinal directions are absolute; the rest are interpreted
/// relative to a robot's current heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards decreasing `y`.
    North,
    /// Towards increasing `x`.
    East,
    /// Towards increasing `y`.
    South,
    /// Towards decreasing `x`.
    West,
    /// The current heading.
    Forward,
    /// A quarter turn counter-clockwise.
    Left,
    /// A quarter turn clockwise.
    Right,
    /// A half turn.
    Back,
}

impl Direction {
    /// Resolve this direction against a heading, yielding an absolute direction.
    #[must_use]
    pub const fn resolve(self, heading: Direction) -> Direction {
        match self {
            Direction::North | Direction::East | Direction::South | Direction::West => self,
            Direction::Forward => heading.absolute(),
            Direction::Right => heading.absolute().clockwise(),
            Direction::Back => heading.absolute().clockwise().clockwise(),
            Direction::Left => heading.absolute().clockwise().clockwise().clockwise(),
        }
    }

    /// Unit offset `(dx, dy)` of an absolute direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self.absolute() {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            _ => (-1, 0),
        }
    }

    /// Whether this is one of the four cardinal directions.
    #[must_use]
    pub const fn is_absolute(self) -> bool {
        matches!(
            self,
            Direction::North | Direction::East | Direction::South | Direction::West
        )
    }

    // Relative directions only make sense against a heading; treat them as north.
    const fn absolute(self) -> Direction {
        if self.is_absolute() { self } else { Direction::North }
    }

    const fn clockwise(self) -> Direction {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            _ => Direction::North,
        }
    }

    /// Lower-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
            Direction::Forward => "forward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Back => "back",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_resolution() {
        assert_eq!(Direction::Left.resolve(Direction::North), Direction::West);
        assert_eq!(Direction::Right.resolve(Direction::West), Direction::North);
        assert_eq!(Direction::Back.resolve(Direction::East), Direction::West);
        assert_eq!(Direction::Forward.resolve(Direction::South), Direction::South);
        assert_eq!(Direction::East.resolve(Direction::South), Direction::East);
    }

    #[test]
    fn test_offsets() {
        assert_eq!(Direction::North.offset(), (0, -1));
        assert_eq!(Direction::West.offset(), (-1, 0));
    }
}
