//! Compass actions and the single direction-delta table.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::grid::Position;

/// One of the four compass moves available in every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Left,
    Right,
    Up,
    Down,
}

impl Action {
    /// Fixed enumeration order. Greedy policy extraction keeps the first
    /// action in this order when several tie.
    pub const ALL: [Self; 4] = [Self::Left, Self::Right, Self::Up, Self::Down];

    /// Unit `(row, col)` delta for this action.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Left => (0, -1),
            Self::Right => (0, 1),
            Self::Up => (-1, 0),
            Self::Down => (1, 0),
        }
    }

    /// The two slip directions, in the order their outcomes are listed.
    #[must_use]
    pub const fn perpendicular(self) -> [Self; 2] {
        match self {
            Self::Left | Self::Right => [Self::Down, Self::Up],
            Self::Up | Self::Down => [Self::Right, Self::Left],
        }
    }

    /// Position reached by applying this action's delta to `from`.
    #[must_use]
    pub const fn apply(self, from: Position) -> Position {
        let (dr, dc) = self.delta();
        Position::new(from.row + dr, from.col + dc)
    }

    /// Action whose delta leads from `from` to the adjacent `to`.
    ///
    /// Returns `None` when the two positions are not orthogonally adjacent.
    #[must_use]
    pub fn between(from: Position, to: Position) -> Option<Self> {
        let delta = (to.row - from.row, to.col - from.col);
        Self::ALL.into_iter().find(|action| action.delta() == delta)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}
